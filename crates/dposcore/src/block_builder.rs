//! # Block Builder
//!
//! Assembles blocks for the simulator.
//!
//! Each block carries exactly one transaction: the miner's call into the
//! consensus contract. The call's logs (including any finality marker) make
//! up the transaction result, and the header bloom is the union of the
//! result blooms so discovery can skip blocks cheaply.

use dposcore_consensus::{Behaviour, CONSENSUS_EXTRA_DATA_KEY};
use dposcore_types::{Address, Block, BlockHeader, Bloom, Hash, LogEvent, Timestamp, Transaction, TransactionResult};
use tracing::debug;

/// Configuration for block building
#[derive(Debug, Clone)]
pub struct BlockBuilderConfig {
    /// Chain ID
    pub chain_id: u64,
    /// Address of the consensus contract
    pub consensus_address: Address,
}

/// A block together with the execution results of its transactions.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// The block
    pub block: Block,
    /// One result per transaction, in block order
    pub results: Vec<TransactionResult>,
}

/// Inputs describing the block to build.
#[derive(Debug, Clone)]
pub struct BlockTemplate<'a> {
    /// Parent block hash
    pub parent_hash: Hash,
    /// Parent block height
    pub parent_height: u64,
    /// Production time
    pub time: Timestamp,
    /// Producing miner's public key bytes
    pub miner_pubkey: &'a [u8],
    /// Behaviour the block carries out
    pub behaviour: Behaviour,
    /// Consensus header payload
    pub consensus_extra_data: Vec<u8>,
    /// Logs emitted by the consensus call
    pub logs: Vec<LogEvent>,
}

/// Builds consensus blocks.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    config: BlockBuilderConfig,
}

impl BlockBuilder {
    /// Create a new block builder.
    pub fn new(config: BlockBuilderConfig) -> Self {
        Self { config }
    }

    /// Builder configuration.
    pub fn config(&self) -> &BlockBuilderConfig {
        &self.config
    }

    /// Builds the block described by `template`.
    pub fn build_block(&self, template: BlockTemplate<'_>) -> BuiltBlock {
        let height = template.parent_height + 1;
        let transaction = Transaction::new(
            Address::from_public_key(template.miner_pubkey),
            self.config.consensus_address,
            template.parent_height,
            template.behaviour.to_string(),
            template.consensus_extra_data.clone(),
        );
        let tx_id = transaction.hash();

        let log_blooms: Vec<Bloom> = template.logs.iter().map(LogEvent::bloom).collect();
        let mut header = BlockHeader::new(self.config.chain_id, height, template.time, template.parent_hash);
        header.bloom = Bloom::combine_all(&log_blooms);
        header.signer_pubkey = template.miner_pubkey.to_vec();
        header
            .extra_data
            .insert(CONSENSUS_EXTRA_DATA_KEY.to_string(), template.consensus_extra_data);

        let block = Block::new(header, vec![tx_id]);
        let result = TransactionResult::mined(tx_id, block.hash(), height, template.logs);

        debug!(
            height,
            behaviour = %template.behaviour,
            logs = result.logs.len(),
            "Built block"
        );
        BuiltBlock {
            block,
            results: vec![result],
        }
    }

    /// Builds the genesis block.
    pub fn build_genesis(&self, time: Timestamp) -> Block {
        let header = BlockHeader::new(
            self.config.chain_id,
            dposcore_types::GENESIS_BLOCK_HEIGHT,
            time,
            Hash::ZERO,
        );
        Block::new(header, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dposcore_consensus::{IrreversibleBlockFound, IRREVERSIBLE_BLOCK_FOUND_EVENT};

    fn builder() -> BlockBuilder {
        BlockBuilder::new(BlockBuilderConfig {
            chain_id: 7,
            consensus_address: Address::from_name("Consensus"),
        })
    }

    #[test]
    fn test_block_carries_consensus_payload() {
        let builder = builder();
        let genesis = builder.build_genesis(Timestamp::ZERO);
        let built = builder.build_block(BlockTemplate {
            parent_hash: genesis.hash(),
            parent_height: genesis.height(),
            time: Timestamp::from_millis(4000),
            miner_pubkey: &[4, 1, 2],
            behaviour: Behaviour::UpdateValue,
            consensus_extra_data: vec![9, 9],
            logs: Vec::new(),
        });

        assert_eq!(built.block.height(), 2);
        assert_eq!(built.block.header.extra_data(CONSENSUS_EXTRA_DATA_KEY), Some(&[9u8, 9][..]));
        assert!(built.block.header.bloom.is_empty());
        assert_eq!(built.results[0].block_hash, built.block.hash());
        assert_eq!(built.results[0].transaction_id, built.block.transaction_ids[0]);
    }

    #[test]
    fn test_marker_log_sets_header_bloom() {
        let builder = builder();
        let marker = LogEvent::new(
            Address::from_name("Consensus"),
            IRREVERSIBLE_BLOCK_FOUND_EVENT,
            IrreversibleBlockFound { offset: 3 }.to_bytes(),
        );
        let built = builder.build_block(BlockTemplate {
            parent_hash: Hash::ZERO,
            parent_height: 9,
            time: Timestamp::ZERO,
            miner_pubkey: &[4],
            behaviour: Behaviour::UpdateValue,
            consensus_extra_data: vec![1],
            logs: vec![marker.clone()],
        });
        assert!(marker.bloom().is_in(&built.block.header.bloom));
        assert!(marker.bloom().is_in(&built.results[0].bloom));
    }
}
