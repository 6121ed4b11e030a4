//! Blockchain and transaction-result traits.
//!
//! These cover the reads the irreversible-block discovery needs (blocks,
//! best chain lookups, transaction results) and the single write it performs:
//! advancing the irreversible pointer.

use async_trait::async_trait;
use dposcore_types::{Block, Hash, TransactionResult};
use thiserror::Error;

/// Errors returned by chain collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The requested item does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator failed internally.
    #[error("internal chain error: {0}")]
    Internal(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Snapshot of the node's chain pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainHead {
    /// Height of the best chain tip.
    pub best_chain_height: u64,
    /// Hash of the best chain tip.
    pub best_chain_hash: Hash,
    /// Height of the last irreversible block.
    pub last_irreversible_block_height: u64,
    /// Hash of the last irreversible block.
    pub last_irreversible_block_hash: Hash,
}

/// Context a read-only contract call executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainContext {
    /// Block whose post-state is read.
    pub block_hash: Hash,
    /// Height of that block.
    pub block_height: u64,
}

impl From<ChainHead> for ChainContext {
    fn from(head: ChainHead) -> Self {
        Self {
            block_hash: head.best_chain_hash,
            block_height: head.best_chain_height,
        }
    }
}

/// Access to stored blocks and the best chain.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`); discovery jobs run on
/// a background worker.
#[async_trait]
pub trait BlockchainService: Send + Sync + 'static {
    /// Current chain pointers.
    async fn get_chain(&self) -> ChainResult<ChainHead>;

    /// Fetch a block by hash.
    ///
    /// Returns `Ok(None)` if the block is not stored.
    async fn get_block_by_hash(&self, hash: &Hash) -> ChainResult<Option<Block>>;

    /// Hash of the block at `height` on the current best chain.
    ///
    /// Returns `Ok(None)` if the best chain is shorter than `height`.
    async fn get_block_hash_by_height(&self, height: u64) -> ChainResult<Option<Hash>>;

    /// Advance the irreversible pointer to `(height, hash)`.
    ///
    /// Returns `Ok(false)` when the request does not move the pointer
    /// forward (height at or below the current pointer) or does not match
    /// the best chain. The pointer never moves backwards.
    async fn set_irreversible(&self, height: u64, hash: Hash) -> ChainResult<bool>;
}

/// Access to transaction execution results.
#[async_trait]
pub trait TransactionResultQuery: Send + Sync + 'static {
    /// Result of `tx_id` as executed in `block_hash`.
    ///
    /// Returns `Ok(None)` if the result has not been persisted.
    async fn get_transaction_result(
        &self,
        tx_id: &Hash,
        block_hash: &Hash,
    ) -> ChainResult<Option<TransactionResult>>;
}
