//! 2048-bit bloom filter over log events.
//!
//! Each transaction result and block header carries a [`Bloom`] summarizing
//! the log events it contains. Scanning for a particular event first checks
//! bloom containment so most blocks can be skipped without touching logs.
//!
//! A value sets three bits: its SHA-256 digest is read as three 11-bit
//! indices taken from byte pairs `(0,1)`, `(2,3)` and `(4,5)`.

use crate::{Error, Hash, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Size of a bloom in bytes.
pub const BLOOM_SIZE: usize = 256;

const BITS_MASK: usize = BLOOM_SIZE * 8 - 1;

/// A 256-byte bloom filter.
#[derive(Clone, PartialEq, Eq, std::hash::Hash)]
pub struct Bloom([u8; BLOOM_SIZE]);

impl Default for Bloom {
    fn default() -> Self {
        Self([0u8; BLOOM_SIZE])
    }
}

impl Bloom {
    /// Creates a bloom from a byte slice of exactly [`BLOOM_SIZE`] bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != BLOOM_SIZE {
            return Err(Error::InvalidLength {
                expected: BLOOM_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; BLOOM_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Adds an arbitrary byte value to the filter.
    pub fn add_value(&mut self, value: &[u8]) {
        let hash = Hash::sha256(value);
        let h = hash.as_bytes();
        for i in [0usize, 2, 4] {
            let index = (((h[i] as usize) << 8) | h[i + 1] as usize) & BITS_MASK;
            let byte = BLOOM_SIZE - 1 - index / 8;
            self.0[byte] |= 1 << (7 - index % 8);
        }
    }

    /// Unions another bloom into this one.
    pub fn combine(&mut self, other: &Bloom) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
    }

    /// Unions several blooms into a fresh one.
    pub fn combine_all<'a>(blooms: impl IntoIterator<Item = &'a Bloom>) -> Bloom {
        let mut out = Bloom::default();
        for bloom in blooms {
            out.combine(bloom);
        }
        out
    }

    /// True if every bit set in `self` is also set in `container`.
    ///
    /// An empty bloom is contained in anything.
    pub fn is_in(&self, container: &Bloom) -> bool {
        self.0
            .iter()
            .zip(container.0.iter())
            .all(|(a, b)| a & b == *a)
    }

    /// True if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: u32 = self.0.iter().map(|b| b.count_ones()).sum();
        write!(f, "Bloom({set} bits)")
    }
}

impl Serialize for Bloom {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_value_sets_at_most_three_bits() {
        let mut bloom = Bloom::default();
        bloom.add_value(b"IrreversibleBlockFound");
        let set: u32 = bloom.as_bytes().iter().map(|b| b.count_ones()).sum();
        assert!((1..=3).contains(&set));
    }

    #[test]
    fn test_is_in() {
        let mut a = Bloom::default();
        a.add_value(b"a");
        let mut b = Bloom::default();
        b.add_value(b"b");

        let ab = Bloom::combine_all([&a, &b]);
        assert!(a.is_in(&ab));
        assert!(b.is_in(&ab));
        assert!(!ab.is_in(&a) || a == ab);
        assert!(Bloom::default().is_in(&a));
    }

    #[test]
    fn test_from_slice_length() {
        assert!(Bloom::from_slice(&[0u8; 10]).is_err());
        assert!(Bloom::from_slice(&[0u8; BLOOM_SIZE]).unwrap().is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut bloom = Bloom::default();
        bloom.add_value(b"x");
        let json = serde_json::to_string(&bloom).unwrap();
        let decoded: Bloom = serde_json::from_str(&json).unwrap();
        assert_eq!(bloom, decoded);
    }
}
