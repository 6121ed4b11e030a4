//! # Round Model
//!
//! A [`Round`] is one rotation of the miner set through their time slots,
//! plus the production history recorded so far. Rounds are read-only inputs
//! to the behaviour engine and command strategies; new rounds are produced
//! by [`crate::transition`].
//!
//! ## Slot layout
//!
//! ```text
//! round_start = expected time of order 1
//!
//! | order 1 | order 2 | ... | order N | extra slot |
//! ^ round_start                       ^ extra_block_mining_time
//! |<------------ (N + 1) * mining_interval ------------>|
//! ```

use dposcore_types::{Hash, Timestamp};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Structural problems detected by [`Round::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// The round has no miners
    #[error("round {0} has no miners")]
    Empty(u64),

    /// Map key and miner pubkey disagree
    #[error("miner keyed as {key} carries pubkey {pubkey}")]
    PubkeyMismatch {
        /// Map key
        key: String,
        /// Pubkey stored in the entry
        pubkey: String,
    },

    /// Order outside `1..=N`
    #[error("miner {pubkey} has order {order} outside 1..={count}")]
    OrderOutOfRange {
        /// Offending miner
        pubkey: String,
        /// Its order
        order: u32,
        /// Number of miners
        count: usize,
    },

    /// Two miners share an order
    #[error("order {0} assigned more than once")]
    DuplicateOrder(u32),

    /// Expected mining times do not advance by exactly one interval
    #[error("miner {pubkey} expected at {actual}, should be {expected}")]
    UnexpectedMiningTime {
        /// Offending miner
        pubkey: String,
        /// Time implied by its order
        expected: Timestamp,
        /// Time recorded in the round
        actual: Timestamp,
    },

    /// Mining interval is zero
    #[error("mining interval must be positive")]
    ZeroInterval,
}

/// One miner's slot and production record within a round.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinerInRound {
    /// Hex public key
    pub pubkey: String,
    /// 1-based slot position
    pub order: u32,
    /// Whether this miner closes the round in the extra slot
    #[serde(default)]
    pub is_extra_block_producer: bool,
    /// Start of this miner's slot
    pub expected_mining_time: Timestamp,
    /// Production times observed this round, oldest first
    #[serde(default)]
    pub actual_mining_times: Vec<Timestamp>,
    /// Blocks produced across the miner's history
    #[serde(default)]
    pub produced_blocks: u64,
    /// Blocks produced during the current slot (normal and tiny)
    #[serde(default)]
    pub produced_tiny_blocks: u32,
    /// Slots this miner failed to use
    #[serde(default)]
    pub missed_time_slots: u64,
    /// Commitment published this round
    #[serde(default)]
    pub out_value: Option<Hash>,
    /// Signature derived from the revealed value; seeds next-round ordering
    #[serde(default)]
    pub signature: Option<Hash>,
    /// Value revealed for the previous round's commitment
    #[serde(default)]
    pub previous_in_value: Option<Hash>,
    /// Order derived from `signature`
    #[serde(default)]
    pub supposed_order_of_next_round: u32,
    /// Order after conflict resolution
    #[serde(default)]
    pub final_order_of_next_round: u32,
    /// Chain height when this miner published its value
    #[serde(default)]
    pub implied_irreversible_block_height: u64,
}

impl MinerInRound {
    /// Creates a miner entry with an assigned slot.
    pub fn new(pubkey: impl Into<String>, order: u32, expected_mining_time: Timestamp) -> Self {
        Self {
            pubkey: pubkey.into(),
            order,
            expected_mining_time,
            ..Default::default()
        }
    }

    /// True until the miner has produced anything in this round.
    pub fn is_new_round_for_this_miner(&self) -> bool {
        self.actual_mining_times.is_empty()
    }

    /// True once the miner has published its commitment this round.
    pub fn is_mined_block_for_current_round(&self) -> bool {
        self.out_value.is_some()
    }
}

/// One scheduling epoch: ordered miners, their slots and production history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Round {
    /// Increases by one per round transition
    pub round_number: u64,
    /// Increases only on term change
    pub term_number: u64,
    /// Miners keyed by hex public key
    pub miners: BTreeMap<String, MinerInRound>,
    /// Miner that closed the previous round
    #[serde(default)]
    pub extra_block_producer_of_previous_round: String,
    /// True for the first round after a miner-set change
    #[serde(default)]
    pub is_miner_list_just_changed: bool,
    /// Slot length in milliseconds
    pub mining_interval_ms: u64,
    /// Last irreversible height confirmed by the miners
    #[serde(default)]
    pub confirmed_irreversible_block_height: u64,
    /// Round in which that height was confirmed
    #[serde(default)]
    pub confirmed_irreversible_block_round_number: u64,
}

impl Round {
    /// Looks up a miner.
    pub fn miner(&self, pubkey: &str) -> Option<&MinerInRound> {
        self.miners.get(pubkey)
    }

    /// Whether `pubkey` mines in this round.
    pub fn is_miner(&self, pubkey: &str) -> bool {
        self.miners.contains_key(pubkey)
    }

    /// Number of miners.
    pub fn miner_count(&self) -> usize {
        self.miners.len()
    }

    /// Miners sorted by slot order.
    pub fn miners_by_order(&self) -> Vec<&MinerInRound> {
        let mut miners: Vec<_> = self.miners.values().collect();
        miners.sort_by_key(|m| m.order);
        miners
    }

    /// The order-1 miner (boot miner in round 1).
    pub fn first_miner(&self) -> Option<&MinerInRound> {
        self.miners.values().find(|m| m.order == 1)
    }

    /// The miner holding the highest order.
    pub fn last_miner(&self) -> Option<&MinerInRound> {
        self.miners.values().max_by_key(|m| m.order)
    }

    /// Slot length in milliseconds.
    pub fn mining_interval(&self) -> u64 {
        self.mining_interval_ms
    }

    /// Expected mining time of the order-1 miner.
    pub fn round_start_time(&self) -> Timestamp {
        self.first_miner()
            .map(|m| m.expected_mining_time)
            .unwrap_or_default()
    }

    /// Length of the whole round including the extra slot.
    pub fn total_milliseconds(&self) -> u64 {
        (self.miner_count() as u64 + 1) * self.mining_interval_ms
    }

    /// Start of the extra slot that follows the last ordinary slot.
    pub fn extra_block_mining_time(&self) -> Timestamp {
        self.last_miner()
            .map(|m| m.expected_mining_time.add_millis(self.mining_interval_ms))
            .unwrap_or_default()
    }

    /// The miner designated to close this round.
    pub fn extra_block_producer(&self) -> Option<&MinerInRound> {
        self.miners.values().find(|m| m.is_extra_block_producer)
    }

    /// Quorum size: `N * 2 / 3 + 1`.
    pub fn minimum_miners_count(&self) -> usize {
        self.miner_count() * 2 / 3 + 1
    }

    /// Miners that published a commitment this round.
    pub fn mined_miners(&self) -> Vec<&MinerInRound> {
        self.miners
            .values()
            .filter(|m| m.is_mined_block_for_current_round())
            .collect()
    }

    /// Miners that did not publish a commitment this round.
    pub fn not_mined_miners(&self) -> Vec<&MinerInRound> {
        self.miners
            .values()
            .filter(|m| !m.is_mined_block_for_current_round())
            .collect()
    }

    /// Production times recorded at or before this round's start.
    ///
    /// Non-zero only for the previous round's extra block producer, whose
    /// closing block and tiny blocks land in the new round's record.
    pub fn blocks_before_round_start(&self, miner: &MinerInRound) -> u32 {
        let start = self.round_start_time();
        miner
            .actual_mining_times
            .iter()
            .filter(|t| **t <= start)
            .count() as u32
    }

    /// Whether `pubkey`'s slot has ended at `now`.
    ///
    /// Round 1 has no reliable expected times, so the slot position is
    /// measured from the boot miner's first block instead. Returns `false`
    /// for non-miners and, in round 1, until the boot miner has produced.
    pub fn is_time_slot_passed(&self, pubkey: &str, now: Timestamp) -> bool {
        let Some(miner) = self.miner(pubkey) else {
            return false;
        };
        let interval = self.mining_interval_ms;

        if self.round_number != 1 {
            return miner.expected_mining_time.add_millis(interval) < now;
        }

        let Some(boot_start) = self
            .first_miner()
            .and_then(|m| m.actual_mining_times.first().copied())
        else {
            return false;
        };
        if interval == 0 {
            return false;
        }
        let expected_order = now.saturating_millis_since(boot_start) / interval + 1;
        (miner.order as u64) < expected_order
    }

    /// Next slot `pubkey` may use after missing its own.
    ///
    /// The extra block producer keeps the extra slot while it is still ahead;
    /// everybody else is placed at their own order in the first full round
    /// that starts after `now`.
    pub fn arrange_abnormal_mining_time(&self, pubkey: &str, now: Timestamp) -> Timestamp {
        let Some(miner) = self.miner(pubkey) else {
            return Timestamp::MAX;
        };
        let interval = self.mining_interval_ms;

        if miner.is_extra_block_producer {
            let extra = self.extra_block_mining_time();
            if extra.add_millis(interval) > now {
                return extra;
            }
        }

        let total = self.total_milliseconds().max(1);
        let round_start = self.round_start_time();
        let missed_rounds = now.saturating_millis_since(round_start) / total;
        let future_round_start = round_start.add_millis((missed_rounds + 1) * total);
        future_round_start.add_millis(miner.order.saturating_sub(1) as u64 * interval)
    }

    /// Checks order density and expected-time progression.
    pub fn validate(&self) -> Result<(), RoundError> {
        if self.miners.is_empty() {
            return Err(RoundError::Empty(self.round_number));
        }
        if self.mining_interval_ms == 0 {
            return Err(RoundError::ZeroInterval);
        }

        let count = self.miner_count();
        let mut seen = HashSet::with_capacity(count);
        for (key, miner) in &self.miners {
            if key != &miner.pubkey {
                return Err(RoundError::PubkeyMismatch {
                    key: key.clone(),
                    pubkey: miner.pubkey.clone(),
                });
            }
            if miner.order == 0 || miner.order as usize > count {
                return Err(RoundError::OrderOutOfRange {
                    pubkey: miner.pubkey.clone(),
                    order: miner.order,
                    count,
                });
            }
            if !seen.insert(miner.order) {
                return Err(RoundError::DuplicateOrder(miner.order));
            }
        }

        let start = self.round_start_time();
        for miner in self.miners.values() {
            let expected = start.add_millis((miner.order as u64 - 1) * self.mining_interval_ms);
            if miner.expected_mining_time != expected {
                return Err(RoundError::UnexpectedMiningTime {
                    pubkey: miner.pubkey.clone(),
                    expected,
                    actual: miner.expected_mining_time,
                });
            }
        }
        Ok(())
    }

    /// RLP encoding of the round.
    pub fn to_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decodes a round from its RLP encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecoderError> {
        rlp::decode(bytes)
    }
}

pub(crate) fn append_optional_hash(s: &mut RlpStream, value: &Option<Hash>) {
    match value {
        Some(hash) => s.append(hash),
        None => s.append_empty_data(),
    };
}

pub(crate) fn optional_hash_at(rlp: &Rlp<'_>, index: usize) -> Result<Option<Hash>, DecoderError> {
    let bytes: Vec<u8> = rlp.val_at(index)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Hash::from_slice(&bytes)
        .map(Some)
        .map_err(|_| DecoderError::RlpInvalidLength)
}

impl Encodable for MinerInRound {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(14);
        s.append(&self.pubkey);
        s.append(&self.order);
        s.append(&(self.is_extra_block_producer as u8));
        s.append(&self.expected_mining_time);
        s.append_list(&self.actual_mining_times);
        s.append(&self.produced_blocks);
        s.append(&self.produced_tiny_blocks);
        s.append(&self.missed_time_slots);
        append_optional_hash(s, &self.out_value);
        append_optional_hash(s, &self.signature);
        append_optional_hash(s, &self.previous_in_value);
        s.append(&self.supposed_order_of_next_round);
        s.append(&self.final_order_of_next_round);
        s.append(&self.implied_irreversible_block_height);
    }
}

impl Decodable for MinerInRound {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 14 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let extra: u8 = rlp.val_at(2)?;
        Ok(Self {
            pubkey: rlp.val_at(0)?,
            order: rlp.val_at(1)?,
            is_extra_block_producer: extra != 0,
            expected_mining_time: rlp.val_at(3)?,
            actual_mining_times: rlp.list_at(4)?,
            produced_blocks: rlp.val_at(5)?,
            produced_tiny_blocks: rlp.val_at(6)?,
            missed_time_slots: rlp.val_at(7)?,
            out_value: optional_hash_at(rlp, 8)?,
            signature: optional_hash_at(rlp, 9)?,
            previous_in_value: optional_hash_at(rlp, 10)?,
            supposed_order_of_next_round: rlp.val_at(11)?,
            final_order_of_next_round: rlp.val_at(12)?,
            implied_irreversible_block_height: rlp.val_at(13)?,
        })
    }
}

impl Encodable for Round {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(8);
        s.append(&self.round_number);
        s.append(&self.term_number);
        s.append(&self.mining_interval_ms);
        s.append(&self.extra_block_producer_of_previous_round);
        s.append(&(self.is_miner_list_just_changed as u8));
        s.append(&self.confirmed_irreversible_block_height);
        s.append(&self.confirmed_irreversible_block_round_number);
        s.begin_list(self.miners.len());
        for miner in self.miners.values() {
            s.append(miner);
        }
    }
}

impl Decodable for Round {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 8 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let just_changed: u8 = rlp.val_at(4)?;
        let miners: Vec<MinerInRound> = rlp.list_at(7)?;
        let miners = miners
            .into_iter()
            .map(|miner| (miner.pubkey.clone(), miner))
            .collect();

        Ok(Self {
            round_number: rlp.val_at(0)?,
            term_number: rlp.val_at(1)?,
            mining_interval_ms: rlp.val_at(2)?,
            extra_block_producer_of_previous_round: rlp.val_at(3)?,
            is_miner_list_just_changed: just_changed != 0,
            confirmed_irreversible_block_height: rlp.val_at(5)?,
            confirmed_irreversible_block_round_number: rlp.val_at(6)?,
            miners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: u64 = 4000;

    fn round(number: u64, count: u32, start: u64) -> Round {
        let miners = (1..=count)
            .map(|order| {
                let pubkey = format!("m{order}");
                let expected = Timestamp::from_millis(start + (order as u64 - 1) * INTERVAL);
                (pubkey.clone(), MinerInRound::new(pubkey, order, expected))
            })
            .collect();
        Round {
            round_number: number,
            term_number: 1,
            miners,
            mining_interval_ms: INTERVAL,
            ..Default::default()
        }
    }

    #[test]
    fn test_slot_layout() {
        let r = round(2, 5, 100_000);
        assert_eq!(r.round_start_time(), Timestamp::from_millis(100_000));
        assert_eq!(r.total_milliseconds(), 6 * INTERVAL);
        assert_eq!(r.extra_block_mining_time(), Timestamp::from_millis(100_000 + 5 * INTERVAL));
        assert_eq!(r.minimum_miners_count(), 4);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_duplicate_order() {
        let mut r = round(2, 3, 0);
        r.miners.get_mut("m3").unwrap().order = 2;
        assert!(matches!(
            r.validate(),
            Err(RoundError::DuplicateOrder(2)) | Err(RoundError::UnexpectedMiningTime { .. })
        ));
    }

    #[test]
    fn test_validate_detects_bad_progression() {
        let mut r = round(2, 3, 0);
        r.miners.get_mut("m2").unwrap().expected_mining_time = Timestamp::from_millis(1);
        assert!(matches!(
            r.validate(),
            Err(RoundError::UnexpectedMiningTime { .. })
        ));
    }

    #[test]
    fn test_time_slot_passed_steady_state() {
        let r = round(2, 3, 10_000);
        // m2 slot: [14000, 18000]
        assert!(!r.is_time_slot_passed("m2", Timestamp::from_millis(18_000)));
        assert!(r.is_time_slot_passed("m2", Timestamp::from_millis(18_001)));
        assert!(!r.is_time_slot_passed("nobody", Timestamp::MAX));
    }

    #[test]
    fn test_time_slot_passed_first_round_uses_boot_miner() {
        let mut r = round(1, 3, 10_000);
        assert!(!r.is_time_slot_passed("m1", Timestamp::from_millis(1_000_000)));

        r.miners
            .get_mut("m1")
            .unwrap()
            .actual_mining_times
            .push(Timestamp::from_millis(50_000));
        // (now - 50000) / 4000 + 1 == 2 at now = 54000
        assert!(r.is_time_slot_passed("m1", Timestamp::from_millis(54_000)));
        assert!(!r.is_time_slot_passed("m2", Timestamp::from_millis(54_000)));
    }

    #[test]
    fn test_arrange_abnormal_mining_time() {
        let r = round(2, 5, 0);
        // total = 24000; now = 30000 -> one missed round, future start 48000
        let t = r.arrange_abnormal_mining_time("m3", Timestamp::from_millis(30_000));
        assert_eq!(t, Timestamp::from_millis(48_000 + 2 * INTERVAL));
    }

    #[test]
    fn test_arrange_abnormal_keeps_extra_slot() {
        let mut r = round(2, 5, 0);
        r.miners.get_mut("m2").unwrap().is_extra_block_producer = true;
        let t = r.arrange_abnormal_mining_time("m2", Timestamp::from_millis(19_000));
        assert_eq!(t, r.extra_block_mining_time());
    }

    #[test]
    fn test_blocks_before_round_start() {
        let mut r = round(3, 3, 10_000);
        let m = r.miners.get_mut("m1").unwrap();
        m.actual_mining_times = vec![
            Timestamp::from_millis(9_000),
            Timestamp::from_millis(9_500),
            Timestamp::from_millis(10_500),
        ];
        let miner = r.miner("m1").unwrap().clone();
        assert_eq!(r.blocks_before_round_start(&miner), 2);
    }

    #[test]
    fn test_rlp_roundtrip_preserves_optional_values() {
        let mut r = round(4, 3, 10_000);
        let m = r.miners.get_mut("m2").unwrap();
        m.out_value = Some(Hash::sha256(b"out"));
        m.actual_mining_times.push(Timestamp::from_millis(14_100));
        m.implied_irreversible_block_height = 17;
        r.is_miner_list_just_changed = true;

        let decoded = Round::from_bytes(&r.to_bytes()).unwrap();
        assert_eq!(decoded, r);
    }

    #[test]
    fn test_json_snapshot_defaults_missing_fields() {
        let json = r#"{
            "round_number": 2,
            "term_number": 1,
            "mining_interval_ms": 4000,
            "miners": {
                "m1": { "pubkey": "m1", "order": 1, "expected_mining_time": 0 },
                "m2": { "pubkey": "m2", "order": 2, "expected_mining_time": 4000 }
            }
        }"#;
        let r: Round = serde_json::from_str(json).unwrap();
        assert!(r.validate().is_ok());
        assert!(r.miner("m2").unwrap().is_new_round_for_this_miner());
        assert_eq!(r.extra_block_mining_time(), Timestamp::from_millis(8000));
    }
}
