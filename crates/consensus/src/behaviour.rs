//! # Behaviour Decision Engine
//!
//! Maps `(round, pubkey, now)` to the single action a miner should take next.
//! The function is pure: it reads a round snapshot and never mutates it, so it
//! may be called from any task concurrently.
//!
//! ## Decision flow
//!
//! ```text
//! not a miner ------------------------------------------> Nothing
//! no value published this round:
//!   round 1, not boot miner, boot miner silent ---------> NextRound
//!   closed previous round, before round start, budget --> TinyBlock
//!   miner list just changed ----------------------------> UpdateValueWithoutPreviousInValue
//!   slot not passed ------------------------------------> UpdateValue
//! value published, slot not passed:
//!   tiny budget left -----------------------------------> TinyBlock
//!   closed previous round, extended budget left --------> TinyBlock
//! otherwise ---------------------------------------------> terminate round
//!   main chain: NextTerm once a quorum crossed the term boundary, else NextRound
//!   side chain: NextRound
//! ```

use crate::round::Round;
use dposcore_config::{ChainKind, ConsensusConfig};
use dposcore_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// What a miner should do next.
///
/// The discriminants are the wire values of the behaviour hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, std::hash::Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Behaviour {
    /// Publish this round's value together with the previous round's secret
    UpdateValue = 0,
    /// Close the round and publish the next one
    NextRound = 1,
    /// Close the round and start a new term
    NextTerm = 2,
    /// Do not mine
    #[default]
    Nothing = 3,
    /// Produce a filler block within the current slot
    TinyBlock = 4,
    /// Publish this round's value without a previous secret
    UpdateValueWithoutPreviousInValue = 5,
}

impl Behaviour {
    /// Wire discriminant.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire discriminant. Unknown values decode to
    /// [`Behaviour::Nothing`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Behaviour::UpdateValue,
            1 => Behaviour::NextRound,
            2 => Behaviour::NextTerm,
            4 => Behaviour::TinyBlock,
            5 => Behaviour::UpdateValueWithoutPreviousInValue,
            _ => Behaviour::Nothing,
        }
    }

    /// Whether this behaviour publishes the miner's value for the round.
    pub fn is_update_value(self) -> bool {
        matches!(
            self,
            Behaviour::UpdateValue | Behaviour::UpdateValueWithoutPreviousInValue
        )
    }

    /// Whether this behaviour closes the current round.
    pub fn terminates_round(self) -> bool {
        matches!(self, Behaviour::NextRound | Behaviour::NextTerm)
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Behaviour::UpdateValue => "UpdateValue",
            Behaviour::NextRound => "NextRound",
            Behaviour::NextTerm => "NextTerm",
            Behaviour::Nothing => "Nothing",
            Behaviour::TinyBlock => "TinyBlock",
            Behaviour::UpdateValueWithoutPreviousInValue => "UpdateValueWithoutPreviousInValue",
        };
        f.write_str(name)
    }
}

/// Chain-specific round termination rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFlavor {
    /// Terms change once enough miners produced past the term boundary.
    Main {
        /// Time the chain started
        blockchain_start: Timestamp,
        /// Term length in seconds
        period_seconds: u64,
    },
    /// Terms never change.
    Side,
}

impl ChainFlavor {
    /// Builds the flavor from configuration.
    pub fn from_config(kind: ChainKind, consensus: &ConsensusConfig) -> Self {
        match kind {
            ChainKind::Main => ChainFlavor::Main {
                blockchain_start: Timestamp::from_millis(consensus.blockchain_start_ms),
                period_seconds: consensus.period_seconds,
            },
            ChainKind::Side => ChainFlavor::Side,
        }
    }

    /// Replaces the chain start time (main chain only).
    ///
    /// The start time is chain state, so services read it from the consensus
    /// contract rather than trusting configuration.
    pub fn with_blockchain_start(self, start: Timestamp) -> Self {
        match self {
            ChainFlavor::Main { period_seconds, .. } => ChainFlavor::Main {
                blockchain_start: start,
                period_seconds,
            },
            ChainFlavor::Side => ChainFlavor::Side,
        }
    }

    /// Behaviour that closes `round`.
    pub fn terminate_round(&self, round: &Round) -> Behaviour {
        match *self {
            ChainFlavor::Side => Behaviour::NextRound,
            ChainFlavor::Main {
                blockchain_start,
                period_seconds,
            } => {
                // Round 1 timing is unreliable and a lone miner has no quorum
                // to speak of.
                if round.round_number == 1 || round.miner_count() == 1 {
                    return Behaviour::NextRound;
                }
                if need_to_change_term(round, blockchain_start, period_seconds) {
                    Behaviour::NextTerm
                } else {
                    Behaviour::NextRound
                }
            }
        }
    }
}

/// True when at least `minimum_miners_count` miners last produced outside the
/// current term's time window.
pub fn need_to_change_term(round: &Round, blockchain_start: Timestamp, period_seconds: u64) -> bool {
    let crossed = round
        .miners
        .values()
        .filter_map(|m| m.actual_mining_times.last())
        .filter(|t| is_time_to_change_term(blockchain_start, **t, round.term_number, period_seconds))
        .count();
    crossed >= round.minimum_miners_count()
}

/// Whether `produced_at` falls outside term `term_number`'s window.
pub fn is_time_to_change_term(
    blockchain_start: Timestamp,
    produced_at: Timestamp,
    term_number: u64,
    period_seconds: u64,
) -> bool {
    if period_seconds == 0 {
        return false;
    }
    let elapsed_secs = produced_at.saturating_millis_since(blockchain_start) / 1000;
    elapsed_secs / period_seconds != term_number.saturating_sub(1)
}

/// Decides what `pubkey` should do at `now`.
///
/// Never panics; non-miners get [`Behaviour::Nothing`].
pub fn decide(
    round: &Round,
    pubkey: &str,
    now: Timestamp,
    maximum_tiny_blocks: u32,
    flavor: &ChainFlavor,
) -> Behaviour {
    let Some(miner) = round.miner(pubkey) else {
        debug!(pubkey, round = round.round_number, "Not a miner of current round");
        return Behaviour::Nothing;
    };

    let slot_passed = round.is_time_slot_passed(pubkey, now);
    let closed_previous_round = round.extra_block_producer_of_previous_round == pubkey;

    if !miner.is_mined_block_for_current_round() {
        if round.round_number == 1
            && miner.order != 1
            && round
                .first_miner()
                .map_or(true, |boot| boot.out_value.is_none())
        {
            return Behaviour::NextRound;
        }

        if closed_previous_round
            && now < round.round_start_time()
            && miner.produced_tiny_blocks < maximum_tiny_blocks
        {
            return Behaviour::TinyBlock;
        }

        if round.is_miner_list_just_changed {
            return Behaviour::UpdateValueWithoutPreviousInValue;
        }

        if !slot_passed {
            return Behaviour::UpdateValue;
        }
    } else if !slot_passed {
        if miner.produced_tiny_blocks < maximum_tiny_blocks {
            return Behaviour::TinyBlock;
        }

        let blocks_before_start = round.blocks_before_round_start(miner);
        if closed_previous_round
            && !round.is_miner_list_just_changed
            && miner.produced_tiny_blocks < maximum_tiny_blocks.saturating_add(blocks_before_start)
        {
            return Behaviour::TinyBlock;
        }
    }

    let behaviour = flavor.terminate_round(round);
    debug!(
        pubkey,
        round = round.round_number,
        term = round.term_number,
        %behaviour,
        "Terminating current round"
    );
    behaviour
}
