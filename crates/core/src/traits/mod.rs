//! Collaborator traits consumed by the consensus scheduler.
//!
//! The scheduler never talks to storage, the VM or the network directly.
//! Everything it reads or writes goes through these narrow interfaces:
//!
//! - **Chain**: blocks, the best chain and the irreversible pointer
//! - **Results**: transaction execution results
//! - **Contracts**: system contract addresses and read-only consensus calls
//! - **Crypto**: the node's signing oracle
//!
//! ```ignore
//! use dposcore_core::traits::{BlockchainService, TransactionResultQuery};
//!
//! async fn head_height<C: BlockchainService>(chain: &C) -> u64 {
//!     chain.get_chain().await.map(|c| c.best_chain_height).unwrap_or(0)
//! }
//! ```

mod chain;
mod contract;
mod crypto;

pub use chain::*;
pub use contract::*;
pub use crypto::*;
