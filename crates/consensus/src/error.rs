//! Error types for the consensus service and discovery pipeline.
//!
//! Decision and command building have no error path; only the parts that
//! talk to collaborators can fail.

use dposcore_core::{ChainError, CryptoError};
use thiserror::Error;

/// Errors raised by the consensus service, discovery and task queues.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A chain or contract collaborator failed
    #[error("chain service error: {0}")]
    ChainService(#[from] ChainError),

    /// The signing oracle failed
    #[error("signing error: {0}")]
    Crypto(#[from] CryptoError),

    /// A wire payload could not be decoded
    #[error("decode error: {0}")]
    Codec(#[from] rlp::DecoderError),

    /// The consensus contract returned no current round
    #[error("no current round available")]
    MissingRound,

    /// A system contract name could not be resolved
    #[error("unknown system contract: {0}")]
    UnknownContract(String),

    /// The worker behind a task queue has stopped
    #[error("task queue {0} is closed")]
    QueueClosed(String),
}

/// Result alias for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
