//! In-memory collaborator implementations.
//!
//! Used by the test suites and the `simulate` command. They follow the same
//! contracts as production collaborators: missing data is `Ok(None)`, and the
//! irreversible pointer only ever moves forward along the best chain.

use crate::traits::{
    BlockchainService, ChainError, ChainHead, ChainResult, ContractAddressResolver, CryptoResult,
    PublicKey, Signature, Signer, TransactionResultQuery,
};
use async_trait::async_trait;
use dposcore_types::{Address, Block, Hash, TransactionResult, GENESIS_BLOCK_HEIGHT};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Default)]
struct ChainState {
    blocks: HashMap<Hash, Block>,
    /// Best chain hashes, index `height - GENESIS_BLOCK_HEIGHT`.
    best_chain: Vec<Hash>,
    lib_height: u64,
    lib_hash: Hash,
}

impl ChainState {
    fn best_height(&self) -> u64 {
        self.best_chain.len() as u64 + GENESIS_BLOCK_HEIGHT - 1
    }

    fn hash_at(&self, height: u64) -> Option<Hash> {
        let index = height.checked_sub(GENESIS_BLOCK_HEIGHT)?;
        self.best_chain.get(index as usize).copied()
    }
}

/// A single-branch blockchain held in memory.
#[derive(Default)]
pub struct InMemoryBlockchain {
    state: RwLock<ChainState>,
}

impl InMemoryBlockchain {
    /// Creates an empty chain. The first appended block must be genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block to the best chain.
    ///
    /// The block must extend the current tip. Genesis becomes the initial
    /// irreversible block.
    pub fn append_block(&self, block: Block) -> ChainResult<Hash> {
        let mut state = self.state.write();
        let hash = block.hash();
        let expected_height = state.best_height() + 1;

        if block.height() != expected_height {
            return Err(ChainError::Internal(format!(
                "block {} at height {} does not extend tip height {}",
                hash,
                block.height(),
                expected_height - 1
            )));
        }
        if let Some(tip) = state.best_chain.last() {
            if block.header.previous_block_hash != *tip {
                return Err(ChainError::Internal(format!(
                    "block {} does not build on tip {}",
                    hash, tip
                )));
            }
        }

        if block.is_genesis() {
            state.lib_height = block.height();
            state.lib_hash = hash;
        }
        state.best_chain.push(hash);
        state.blocks.insert(hash, block);
        debug!(height = expected_height, hash = %hash, "Appended block");
        Ok(hash)
    }

    /// Stores a block without placing it on the best chain.
    pub fn store_block(&self, block: Block) -> Hash {
        let hash = block.hash();
        self.state.write().blocks.insert(hash, block);
        hash
    }

    /// Current irreversible height.
    pub fn irreversible_height(&self) -> u64 {
        self.state.read().lib_height
    }

    /// Current best chain height (zero when empty).
    pub fn best_height(&self) -> u64 {
        self.state.read().best_height()
    }
}

#[async_trait]
impl BlockchainService for InMemoryBlockchain {
    async fn get_chain(&self) -> ChainResult<ChainHead> {
        let state = self.state.read();
        let best_chain_hash = state
            .best_chain
            .last()
            .copied()
            .ok_or_else(|| ChainError::NotFound("chain has no genesis block".into()))?;
        Ok(ChainHead {
            best_chain_height: state.best_height(),
            best_chain_hash,
            last_irreversible_block_height: state.lib_height,
            last_irreversible_block_hash: state.lib_hash,
        })
    }

    async fn get_block_by_hash(&self, hash: &Hash) -> ChainResult<Option<Block>> {
        Ok(self.state.read().blocks.get(hash).cloned())
    }

    async fn get_block_hash_by_height(&self, height: u64) -> ChainResult<Option<Hash>> {
        Ok(self.state.read().hash_at(height))
    }

    async fn set_irreversible(&self, height: u64, hash: Hash) -> ChainResult<bool> {
        let mut state = self.state.write();
        if height <= state.lib_height {
            debug!(height, current = state.lib_height, "Irreversible height does not advance");
            return Ok(false);
        }
        if state.hash_at(height) != Some(hash) {
            debug!(height, hash = %hash, "Irreversible block is not on the best chain");
            return Ok(false);
        }
        state.lib_height = height;
        state.lib_hash = hash;
        info!(height, hash = %hash, "Irreversible block advanced");
        Ok(true)
    }
}

/// Transaction results keyed by transaction id.
#[derive(Default)]
pub struct InMemoryTransactionResults {
    results: RwLock<HashMap<Hash, TransactionResult>>,
}

impl InMemoryTransactionResults {
    /// Creates an empty result store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of a transaction.
    pub fn insert(&self, result: TransactionResult) {
        self.results.write().insert(result.transaction_id, result);
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    /// Whether no results are stored.
    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

#[async_trait]
impl TransactionResultQuery for InMemoryTransactionResults {
    async fn get_transaction_result(
        &self,
        tx_id: &Hash,
        block_hash: &Hash,
    ) -> ChainResult<Option<TransactionResult>> {
        Ok(self
            .results
            .read()
            .get(tx_id)
            .filter(|r| r.block_hash == *block_hash)
            .cloned())
    }
}

/// Fixed name-to-address table.
#[derive(Debug, Clone, Default)]
pub struct StaticAddressResolver {
    addresses: HashMap<String, Address>,
}

impl StaticAddressResolver {
    /// Resolver for the given system contracts, addressed by
    /// [`Address::from_name`].
    pub fn with_system_contracts<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let addresses = names
            .into_iter()
            .map(|name| (name.to_string(), Address::from_name(name)))
            .collect();
        Self { addresses }
    }

    /// Registers or replaces a contract address.
    pub fn insert(&mut self, name: impl Into<String>, address: Address) {
        self.addresses.insert(name.into(), address);
    }
}

impl ContractAddressResolver for StaticAddressResolver {
    fn resolve(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }
}

/// Keyed-hash signer with deterministic output.
///
/// Not a real signature scheme; signatures are `sha256(secret || message)`.
#[derive(Clone)]
pub struct DeterministicSigner {
    secret: Hash,
    public_key: PublicKey,
}

impl DeterministicSigner {
    /// Derives a signer from a seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        let secret = Hash::sha256(seed);
        let mut pk = Vec::with_capacity(33);
        pk.push(0x04);
        pk.extend_from_slice(Hash::sha256(secret.as_bytes()).as_bytes());
        Self {
            secret,
            public_key: PublicKey::from_bytes(pk),
        }
    }
}

impl std::fmt::Debug for DeterministicSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicSigner")
            .field("public_key", &self.public_key.to_hex())
            .finish_non_exhaustive()
    }
}

impl Signer for DeterministicSigner {
    fn sign(&self, message: &[u8]) -> CryptoResult<Signature> {
        let digest = Hash::sha256_concat(&[self.secret.as_bytes(), message]);
        Ok(Signature::from_bytes(digest.as_bytes().to_vec()))
    }

    fn public_key(&self) -> PublicKey {
        self.public_key.clone()
    }
}
