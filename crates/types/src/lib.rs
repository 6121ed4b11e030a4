//! # dposcore Types
//!
//! Core type definitions shared by every dposcore crate.
//!
//! This crate provides the fundamental chain types the consensus scheduler
//! reads:
//! - [`Hash`] - 32-byte SHA-256 digests
//! - [`Address`] - 20-byte contract and account addresses
//! - [`Timestamp`] - millisecond wall-clock instants
//! - [`Bloom`] - 2048-bit event membership filters
//! - [`Block`] and [`BlockHeader`] - block structures carrying consensus extra data
//! - [`Transaction`], [`TransactionResult`] and [`LogEvent`] - execution output
//!
//! ## Example
//!
//! ```rust
//! use dposcore_types::{Address, Bloom, Hash, LogEvent};
//!
//! let consensus = Address::from_name("Consensus");
//! let event = LogEvent::new(consensus, "IrreversibleBlockFound", vec![]);
//!
//! let mut block_bloom = Bloom::default();
//! block_bloom.combine(&event.bloom());
//! assert!(event.bloom().is_in(&block_bloom));
//! assert_ne!(Hash::sha256(b"block"), Hash::ZERO);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod block;
pub mod bloom;
pub mod hash;
pub mod time;
pub mod transaction;

// Re-export main types at crate root
pub use address::Address;
pub use block::{Block, BlockHeader, GENESIS_BLOCK_HEIGHT};
pub use bloom::{Bloom, BLOOM_SIZE};
pub use hash::Hash;
pub use time::Timestamp;
pub use transaction::{LogEvent, Transaction, TransactionResult, TransactionResultStatus};

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with dposcore types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid address format
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// RLP decoding error
    #[error("RLP decode error: {0}")]
    RlpDecode(#[from] rlp::DecoderError),
}
