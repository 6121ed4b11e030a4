//! # dposcore Core - Collaborator Abstractions
//!
//! This crate defines the narrow interfaces through which the consensus
//! scheduler reaches the rest of the node:
//!
//! - **Chain**: blocks, best chain lookups and the irreversible pointer
//! - **Results**: transaction execution results and their blooms
//! - **Contracts**: system contract addresses and read-only consensus calls
//! - **Crypto**: the node's signing oracle
//!
//! # Design Philosophy
//!
//! 1. **Trait-based abstractions**: the scheduler depends on traits, never on
//!    the VM, storage or network implementations.
//!
//! 2. **Thread safety**: all traits require `Send + Sync`; discovery runs on a
//!    background worker.
//!
//! 3. **Async-first**: chain and contract reads are async.
//!
//! The [`memory`] module provides in-memory implementations for tests and
//! simulation.
//!
//! # Example
//!
//! ```ignore
//! use dposcore_core::{BlockchainService, TransactionResultQuery};
//!
//! async fn scan<C, R>(chain: &C, results: &R)
//! where
//!     C: BlockchainService,
//!     R: TransactionResultQuery,
//! {
//!     // Works with any chain and result store
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use traits::{
    // Chain
    BlockchainService, ChainContext, ChainError, ChainHead, ChainResult, TransactionResultQuery,
    // Contracts
    ConsensusContractReader, ContractAddressResolver, ValidationResult,
    // Crypto
    CryptoError, CryptoResult, PublicKey, Signature, Signer,
};
