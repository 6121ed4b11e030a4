//! 32-byte SHA-256 hash type.
//!
//! [`Hash`] identifies blocks and transactions and carries the opaque
//! commitment values (`out_value`, `in_value`) exchanged by miners each round.

use crate::{Error, Result};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a hash in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash value.
///
/// # Example
///
/// ```rust
/// use dposcore_types::Hash;
///
/// let hash = Hash::sha256(b"hello world");
/// let parsed: Hash = hash.to_hex().parse().unwrap();
/// assert_eq!(hash, parsed);
/// assert!(!hash.is_zero());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// The all-zero hash, used as "no hash" (e.g. the genesis parent).
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Creates a new hash from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice.
    ///
    /// Returns an error if the slice length is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != HASH_SIZE {
            return Err(Error::InvalidLength {
                expected: HASH_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Computes the SHA-256 hash of the given data.
    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Computes the SHA-256 hash of multiple data slices without concatenating them.
    pub fn sha256_concat(data: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for slice in data {
            hasher.update(slice);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this is the zero hash.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Interprets the first eight bytes as a big-endian signed integer.
    ///
    /// Miners' signatures are folded into next-round orders this way.
    pub fn to_i64(&self) -> i64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[..8]);
        i64::from_be_bytes(word)
    }

    /// Creates a hash from its hex representation (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);

        if s.len() != HASH_SIZE * 2 {
            return Err(Error::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Returns the hex representation with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "0x{}..", hex::encode(&self.0[..6]))
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Encodable for Hash {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Hash {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        if bytes.len() != HASH_SIZE {
            return Err(DecoderError::RlpInvalidLength);
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        let hash = Hash::sha256(b"");
        assert_eq!(
            hash.to_hex(),
            "0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_concat_matches_single() {
        let parts: &[&[u8]] = &[b"hello", b" ", b"world"];
        assert_eq!(Hash::sha256_concat(parts), Hash::sha256(b"hello world"));
    }

    #[test]
    fn test_hex_roundtrip_with_and_without_prefix() {
        let hash = Hash::sha256(b"test");
        let hex_str = hash.to_hex();
        assert_eq!(Hash::from_hex(&hex_str).unwrap(), hash);
        assert_eq!(Hash::from_hex(&hex_str[2..]).unwrap(), hash);
    }

    #[test]
    fn test_invalid_hash() {
        assert!(Hash::from_hex("0x1234").is_err());
        assert!(Hash::from_hex(&format!("0x{}", "GG".repeat(32))).is_err());
    }

    #[test]
    fn test_to_i64_reads_leading_bytes() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[7] = 5;
        assert_eq!(Hash::from(bytes).to_i64(), 5);

        bytes[0] = 0xFF;
        assert!(Hash::from(bytes).to_i64() < 0);
    }

    #[test]
    fn test_hash_serde() {
        let hash = Hash::sha256(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        let decoded: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, decoded);
    }
}
