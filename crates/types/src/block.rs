//! Block and BlockHeader types.
//!
//! This module provides the block-related types:
//! - [`BlockHeader`] - metadata, the block bloom and consensus extra data
//! - [`Block`] - a header plus the ids of the transactions it includes

use crate::{Bloom, Hash, Timestamp};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Height of the first block of every chain.
pub const GENESIS_BLOCK_HEIGHT: u64 = 1;

/// A block header.
///
/// `extra_data` holds named payloads contributed by system modules. The
/// consensus layer stores its header information under the key
/// `"Consensus"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier
    pub chain_id: u64,
    /// Block height (genesis is [`GENESIS_BLOCK_HEIGHT`])
    pub height: u64,
    /// Production time
    pub time: Timestamp,
    /// Hash of the parent block ([`Hash::ZERO`] for genesis)
    pub previous_block_hash: Hash,
    /// Union of the blooms of every transaction result in the block
    pub bloom: Bloom,
    /// Public key of the producing miner
    #[serde(with = "crate::transaction::hex_bytes")]
    pub signer_pubkey: Vec<u8>,
    /// Named extra payloads
    pub extra_data: BTreeMap<String, Vec<u8>>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            chain_id: 1,
            height: GENESIS_BLOCK_HEIGHT,
            time: Timestamp::ZERO,
            previous_block_hash: Hash::ZERO,
            bloom: Bloom::default(),
            signer_pubkey: Vec::new(),
            extra_data: BTreeMap::new(),
        }
    }
}

impl BlockHeader {
    /// Creates a new block header.
    pub fn new(chain_id: u64, height: u64, time: Timestamp, previous_block_hash: Hash) -> Self {
        Self {
            chain_id,
            height,
            time,
            previous_block_hash,
            ..Default::default()
        }
    }

    /// Computes the hash of this block header.
    ///
    /// The hash is the SHA-256 of the RLP-encoded header.
    pub fn hash(&self) -> Hash {
        Hash::sha256(&self.rlp_encode())
    }

    /// RLP encodes the header.
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(7);
        stream.append(&self.chain_id);
        stream.append(&self.height);
        stream.append(&self.time);
        stream.append(&self.previous_block_hash);
        stream.append(&self.bloom.as_bytes().to_vec());
        stream.append(&self.signer_pubkey);
        stream.begin_list(self.extra_data.len());
        for (key, value) in &self.extra_data {
            stream.begin_list(2);
            stream.append(key);
            stream.append(value);
        }
        stream.out().to_vec()
    }

    /// Returns the named extra payload, if present.
    pub fn extra_data(&self, key: &str) -> Option<&[u8]> {
        self.extra_data.get(key).map(Vec::as_slice)
    }

    /// Checks if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == GENESIS_BLOCK_HEIGHT
    }
}

/// A complete block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Ids of the transactions included in the block, in execution order
    pub transaction_ids: Vec<Hash>,
}

impl Block {
    /// Creates a new block.
    pub fn new(header: BlockHeader, transaction_ids: Vec<Hash>) -> Self {
        Self {
            header,
            transaction_ids,
        }
    }

    /// Hash of the block (the header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Height of the block.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Number of transactions.
    pub fn transaction_count(&self) -> usize {
        self.transaction_ids.len()
    }

    /// Checks if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.is_genesis()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block #{} ({}, {} txs)",
            self.header.height,
            self.hash(),
            self.transaction_ids.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hash_is_deterministic() {
        let header = BlockHeader::new(1, 5, Timestamp::from_millis(1000), Hash::sha256(b"parent"));
        assert_eq!(header.hash(), header.clone().hash());
    }

    #[test]
    fn test_header_hash_covers_extra_data() {
        let mut a = BlockHeader::new(1, 5, Timestamp::from_millis(1000), Hash::ZERO);
        let b = a.clone();
        a.extra_data.insert("Consensus".to_string(), vec![1, 2, 3]);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.extra_data("Consensus"), Some(&[1u8, 2, 3][..]));
        assert_eq!(b.extra_data("Consensus"), None);
    }

    #[test]
    fn test_genesis() {
        let block = Block::new(BlockHeader::default(), vec![]);
        assert!(block.is_genesis());
        assert_eq!(block.height(), GENESIS_BLOCK_HEIGHT);
        assert_eq!(block.transaction_count(), 0);
    }
}
