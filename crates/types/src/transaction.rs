//! Transactions, their execution results and emitted log events.
//!
//! Only the parts of execution output the consensus layer reads are modeled
//! here: result status, log events and the per-result [`Bloom`].

use crate::{Address, Bloom, Hash};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// A contract call included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address
    pub from: Address,
    /// Called contract
    pub to: Address,
    /// Height of the block this transaction references
    pub ref_block_number: u64,
    /// Contract method name
    pub method_name: String,
    /// Encoded call parameters
    #[serde(with = "hex_bytes")]
    pub params: Vec<u8>,
}

impl Transaction {
    /// Creates a new transaction.
    pub fn new(
        from: Address,
        to: Address,
        ref_block_number: u64,
        method_name: impl Into<String>,
        params: Vec<u8>,
    ) -> Self {
        Self {
            from,
            to,
            ref_block_number,
            method_name: method_name.into(),
            params,
        }
    }

    /// Transaction id: SHA-256 of the RLP encoding.
    pub fn hash(&self) -> Hash {
        Hash::sha256(&rlp::encode(self))
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.from);
        s.append(&self.to);
        s.append(&self.ref_block_number);
        s.append(&self.method_name);
        s.append(&self.params);
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            from: rlp.val_at(0)?,
            to: rlp.val_at(1)?,
            ref_block_number: rlp.val_at(2)?,
            method_name: rlp.val_at(3)?,
            params: rlp.val_at(4)?,
        })
    }
}

/// An event emitted by a contract during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emitting contract
    pub address: Address,
    /// Event name
    pub name: String,
    /// Encoded event payload
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl LogEvent {
    /// Creates a new log event.
    pub fn new(address: Address, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            address,
            name: name.into(),
            data,
        }
    }

    /// Bloom identifying this event by emitter and name.
    ///
    /// The payload is not part of the bloom, so any event with the same
    /// emitter and name maps to the same bits.
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::default();
        bloom.add_value(self.address.as_bytes());
        bloom.add_value(self.name.as_bytes());
        bloom
    }
}

/// Execution outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResultStatus {
    /// Not yet executed
    Pending,
    /// Executed and included
    Mined,
    /// Executed and reverted
    Failed,
    /// Rejected before execution
    Conflict,
}

/// The result of executing one transaction within a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Transaction id
    pub transaction_id: Hash,
    /// Block the transaction was executed in
    pub block_hash: Hash,
    /// Height of that block
    pub block_number: u64,
    /// Execution outcome
    pub status: TransactionResultStatus,
    /// Events emitted during execution
    pub logs: Vec<LogEvent>,
    /// Union of the blooms of `logs`
    pub bloom: Bloom,
}

impl TransactionResult {
    /// Builds a mined result, computing the bloom from the logs.
    pub fn mined(transaction_id: Hash, block_hash: Hash, block_number: u64, logs: Vec<LogEvent>) -> Self {
        let mut bloom = Bloom::default();
        for log in &logs {
            bloom.combine(&log.bloom());
        }
        Self {
            transaction_id,
            block_hash,
            block_number,
            status: TransactionResultStatus::Mined,
            logs,
            bloom,
        }
    }

    /// Builds a failed result with no logs.
    pub fn failed(transaction_id: Hash, block_hash: Hash, block_number: u64) -> Self {
        Self {
            transaction_id,
            block_hash,
            block_number,
            status: TransactionResultStatus::Failed,
            logs: Vec::new(),
            bloom: Bloom::default(),
        }
    }

    /// True if the transaction executed successfully.
    pub fn is_mined(&self) -> bool {
        self.status == TransactionResultStatus::Mined
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_rlp_roundtrip() {
        let tx = Transaction::new(
            Address::from_name("alice"),
            Address::from_name("Consensus"),
            7,
            "UpdateValue",
            vec![1, 2, 3],
        );
        let decoded: Transaction = rlp::decode(&rlp::encode(&tx)).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.hash(), decoded.hash());
    }

    #[test]
    fn test_log_bloom_ignores_payload() {
        let addr = Address::from_name("Consensus");
        let a = LogEvent::new(addr, "IrreversibleBlockFound", vec![1]);
        let b = LogEvent::new(addr, "IrreversibleBlockFound", vec![2]);
        assert_eq!(a.bloom(), b.bloom());
        assert_ne!(a.bloom(), LogEvent::new(addr, "Transferred", vec![]).bloom());
    }

    #[test]
    fn test_mined_result_bloom_covers_logs() {
        let addr = Address::from_name("Consensus");
        let log = LogEvent::new(addr, "IrreversibleBlockFound", vec![]);
        let other = LogEvent::new(Address::from_name("Token"), "Transferred", vec![]);
        let result = TransactionResult::mined(Hash::sha256(b"tx"), Hash::ZERO, 3, vec![log.clone(), other]);

        assert!(result.is_mined());
        assert!(log.bloom().is_in(&result.bloom));
    }

    #[test]
    fn test_failed_result_has_empty_bloom() {
        let result = TransactionResult::failed(Hash::sha256(b"tx"), Hash::ZERO, 3);
        assert!(!result.is_mined());
        assert!(result.bloom.is_empty());
    }
}
