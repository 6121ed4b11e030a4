//! Signing oracle trait.
//!
//! The consensus scheduler only needs "bytes in, signature bytes out" plus the
//! node's public key; the signature scheme itself is opaque.

use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Generic cryptographic error.
    #[error("crypto error: {0}")]
    Internal(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// A cryptographic signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Bytes);

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes of the signature.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A public key identifying a miner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(pub Bytes);

impl PublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, the form rounds key their miners by.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Trait for digital signature creation.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use dposcore_core::traits::{Signer, CryptoResult, Signature};
///
/// fn sign_message(signer: &impl Signer, message: &[u8]) -> CryptoResult<Signature> {
///     signer.sign(message)
/// }
/// ```
pub trait Signer: Send + Sync {
    /// Sign a message and return the signature.
    fn sign(&self, message: &[u8]) -> CryptoResult<Signature>;

    /// Get the public key corresponding to this signer.
    fn public_key(&self) -> PublicKey;
}
