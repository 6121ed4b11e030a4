//! # Command Strategies
//!
//! Turns a decided [`Behaviour`] into a [`ConsensusCommand`]: when to mine,
//! by when, and how long block execution may take.
//!
//! | Strategy | Used for | Arranged time |
//! |----------|----------|---------------|
//! | [`FirstRoundStrategy`] | round 1 value publishing | now + order-based offset |
//! | [`NormalBlockStrategy`] | value publishing | own expected time |
//! | [`TinyBlockStrategy`] | filler blocks | now + minimum spacing |
//! | [`TerminateRoundStrategy`] | `NextRound` / `NextTerm` | next usable slot |
//!
//! A tiny slot is `mining_interval / 8`. Execution limits are fractions of it:
//! 3/5 by default, 1/2 for the last tiny block of a slot.

use crate::behaviour::Behaviour;
use crate::round::Round;
use dposcore_config::{ConsensusConfig, TINY_SLOTS_PER_INTERVAL};
use dposcore_types::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default spacing between consecutive tiny blocks.
pub const DEFAULT_TINY_BLOCK_MINIMUM_INTERVAL_MS: u64 = 50;

/// Instructions for the mining loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusCommand {
    /// Behaviour the block should carry out
    pub hint: Behaviour,
    /// Earliest time to start mining
    pub arranged_mining_time: Timestamp,
    /// Deadline after which mining is invalid
    pub mining_due_time: Timestamp,
    /// Execution time budget for the block
    pub limit_ms_of_mining_block: u64,
}

impl ConsensusCommand {
    /// The "you may not mine" command.
    pub const INVALID: Self = Self {
        hint: Behaviour::Nothing,
        arranged_mining_time: Timestamp::MAX,
        mining_due_time: Timestamp::MAX,
        limit_ms_of_mining_block: 0,
    };

    /// Whether this is the [`ConsensusCommand::INVALID`] sentinel.
    pub fn is_invalid(&self) -> bool {
        self.hint == Behaviour::Nothing
    }

    /// Milliseconds from `now` until mining should start.
    pub fn next_block_mining_left_ms(&self, now: Timestamp) -> u64 {
        self.arranged_mining_time.saturating_millis_since(now)
    }

    /// Whether `now` lies in `[arranged, due)`.
    pub fn is_in_window(&self, now: Timestamp) -> bool {
        !self.is_invalid() && self.arranged_mining_time <= now && now < self.mining_due_time
    }
}

/// Tuning knobs the strategies need beyond the round itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandParameters {
    /// Tiny blocks per slot
    pub maximum_tiny_blocks: u32,
    /// Spacing between tiny blocks
    pub tiny_block_minimum_interval_ms: u64,
}

impl Default for CommandParameters {
    fn default() -> Self {
        Self {
            maximum_tiny_blocks: 8,
            tiny_block_minimum_interval_ms: DEFAULT_TINY_BLOCK_MINIMUM_INTERVAL_MS,
        }
    }
}

impl From<&ConsensusConfig> for CommandParameters {
    fn from(config: &ConsensusConfig) -> Self {
        Self {
            maximum_tiny_blocks: config.maximum_tiny_blocks,
            tiny_block_minimum_interval_ms: config.tiny_block_minimum_interval_ms,
        }
    }
}

/// Execution budgets derived from a mining interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningTimeLimits {
    /// One tiny slot
    pub tiny_block_slot_ms: u64,
    /// Budget for an ordinary block
    pub default_block_mining_limit_ms: u64,
    /// Budget for the last tiny block of a slot
    pub last_tiny_block_mining_limit_ms: u64,
    /// Budget for the block that closes a term
    pub last_block_of_current_term_mining_limit_ms: u64,
}

impl MiningTimeLimits {
    /// Budgets for `mining_interval_ms`.
    pub fn new(mining_interval_ms: u64) -> Self {
        let tiny = mining_interval_ms / TINY_SLOTS_PER_INTERVAL;
        Self {
            tiny_block_slot_ms: tiny,
            default_block_mining_limit_ms: tiny * 3 / 5,
            last_tiny_block_mining_limit_ms: tiny / 2,
            last_block_of_current_term_mining_limit_ms: tiny * 3 / 5,
        }
    }
}

/// Builds a command for one miner from a round snapshot.
///
/// Round, miner and time are fixed at construction.
pub trait CommandStrategy {
    /// Produces the command.
    fn build(&self) -> ConsensusCommand;
}

/// Round 1 value publishing.
///
/// Expected times are unreliable before anyone produced, so slots are
/// offset from `now`: the boot miner goes after one interval, everybody else
/// waits `(order + N - 1)` intervals.
pub struct FirstRoundStrategy<'a> {
    round: &'a Round,
    pubkey: &'a str,
    now: Timestamp,
    behaviour: Behaviour,
}

impl<'a> FirstRoundStrategy<'a> {
    /// Creates the strategy.
    pub fn new(round: &'a Round, pubkey: &'a str, now: Timestamp, behaviour: Behaviour) -> Self {
        Self {
            round,
            pubkey,
            now,
            behaviour,
        }
    }
}

impl CommandStrategy for FirstRoundStrategy<'_> {
    fn build(&self) -> ConsensusCommand {
        let Some(miner) = self.round.miner(self.pubkey) else {
            return ConsensusCommand::INVALID;
        };
        let interval = self.round.mining_interval();
        let limits = MiningTimeLimits::new(interval);

        let offset = if miner.order == 1
            && self.behaviour == Behaviour::UpdateValueWithoutPreviousInValue
        {
            interval
        } else {
            (miner.order as u64 + self.round.miner_count() as u64 - 1) * interval
        };
        let arranged = self.now.add_millis(offset);

        ConsensusCommand {
            hint: self.behaviour,
            arranged_mining_time: arranged,
            mining_due_time: arranged.add_millis(interval),
            limit_ms_of_mining_block: limits.default_block_mining_limit_ms,
        }
    }
}

/// Value publishing in the miner's own slot.
pub struct NormalBlockStrategy<'a> {
    round: &'a Round,
    pubkey: &'a str,
    now: Timestamp,
    behaviour: Behaviour,
}

impl<'a> NormalBlockStrategy<'a> {
    /// Creates the strategy.
    pub fn new(round: &'a Round, pubkey: &'a str, now: Timestamp, behaviour: Behaviour) -> Self {
        Self {
            round,
            pubkey,
            now,
            behaviour,
        }
    }
}

impl CommandStrategy for NormalBlockStrategy<'_> {
    fn build(&self) -> ConsensusCommand {
        let Some(miner) = self.round.miner(self.pubkey) else {
            return ConsensusCommand::INVALID;
        };
        let interval = self.round.mining_interval();
        let limits = MiningTimeLimits::new(interval);

        let arranged = miner.expected_mining_time.max(self.now);
        let due = miner.expected_mining_time.add_millis(interval);
        if arranged >= due {
            debug!(pubkey = self.pubkey, "Own slot already ended, falling back to next round");
            return TerminateRoundStrategy::new(self.round, self.pubkey, self.now, Behaviour::NextRound)
                .build();
        }

        ConsensusCommand {
            hint: self.behaviour,
            arranged_mining_time: arranged,
            mining_due_time: due,
            limit_ms_of_mining_block: limits.default_block_mining_limit_ms,
        }
    }
}

/// Filler blocks inside the current slot (or the extra slot of the previous
/// round, for the miner that closed it).
pub struct TinyBlockStrategy<'a> {
    round: &'a Round,
    pubkey: &'a str,
    now: Timestamp,
    params: CommandParameters,
}

impl<'a> TinyBlockStrategy<'a> {
    /// Creates the strategy.
    pub fn new(round: &'a Round, pubkey: &'a str, now: Timestamp, params: CommandParameters) -> Self {
        Self {
            round,
            pubkey,
            now,
            params,
        }
    }
}

impl CommandStrategy for TinyBlockStrategy<'_> {
    fn build(&self) -> ConsensusCommand {
        let Some(miner) = self.round.miner(self.pubkey) else {
            return ConsensusCommand::INVALID;
        };
        let interval = self.round.mining_interval();
        let limits = MiningTimeLimits::new(interval);
        let round_start = self.round.round_start_time();
        let before_round_start = self.now < round_start;

        let slot_start = if before_round_start {
            round_start.sub_millis(interval)
        } else if self.round.round_number == 1 {
            miner
                .actual_mining_times
                .first()
                .copied()
                .unwrap_or(miner.expected_mining_time)
        } else {
            miner.expected_mining_time
        };

        let arranged = self.now.add_millis(self.params.tiny_block_minimum_interval_ms);
        let due = slot_start.add_millis(interval);
        if arranged >= due {
            debug!(pubkey = self.pubkey, "No room left for a tiny block, falling back to next round");
            return TerminateRoundStrategy::new(self.round, self.pubkey, self.now, Behaviour::NextRound)
                .build();
        }

        let cap = if before_round_start {
            self.params.maximum_tiny_blocks
        } else if self.round.extra_block_producer_of_previous_round == self.pubkey
            && !self.round.is_miner_list_just_changed
        {
            self.params
                .maximum_tiny_blocks
                .saturating_add(self.round.blocks_before_round_start(miner))
        } else {
            self.params.maximum_tiny_blocks
        };
        let is_last_tiny_block = miner.produced_tiny_blocks.saturating_add(1) >= cap;

        ConsensusCommand {
            hint: Behaviour::TinyBlock,
            arranged_mining_time: arranged,
            mining_due_time: due,
            limit_ms_of_mining_block: if is_last_tiny_block {
                limits.last_tiny_block_mining_limit_ms
            } else {
                limits.default_block_mining_limit_ms
            },
        }
    }
}

/// Closing the round with `NextRound` or `NextTerm`.
pub struct TerminateRoundStrategy<'a> {
    round: &'a Round,
    pubkey: &'a str,
    now: Timestamp,
    behaviour: Behaviour,
}

impl<'a> TerminateRoundStrategy<'a> {
    /// Creates the strategy.
    pub fn new(round: &'a Round, pubkey: &'a str, now: Timestamp, behaviour: Behaviour) -> Self {
        Self {
            round,
            pubkey,
            now,
            behaviour,
        }
    }
}

impl CommandStrategy for TerminateRoundStrategy<'_> {
    fn build(&self) -> ConsensusCommand {
        let Some(miner) = self.round.miner(self.pubkey) else {
            return ConsensusCommand::INVALID;
        };
        let interval = self.round.mining_interval();
        let limits = MiningTimeLimits::new(interval);

        let arranged = if self.round.round_number == 1 && miner.order != 1 {
            self.now
                .add_millis((miner.order as u64 + self.round.miner_count() as u64) * interval)
        } else {
            self.round.arrange_abnormal_mining_time(self.pubkey, self.now)
        };

        ConsensusCommand {
            hint: self.behaviour,
            arranged_mining_time: arranged,
            mining_due_time: arranged.add_millis(interval),
            limit_ms_of_mining_block: if self.behaviour == Behaviour::NextTerm {
                limits.last_block_of_current_term_mining_limit_ms
            } else {
                limits.default_block_mining_limit_ms
            },
        }
    }
}

/// Always answers [`ConsensusCommand::INVALID`].
pub struct InvalidCommandStrategy;

impl CommandStrategy for InvalidCommandStrategy {
    fn build(&self) -> ConsensusCommand {
        ConsensusCommand::INVALID
    }
}

/// Selects the strategy for `behaviour`.
pub fn strategy_for<'a>(
    round: &'a Round,
    pubkey: &'a str,
    now: Timestamp,
    behaviour: Behaviour,
    params: CommandParameters,
) -> Box<dyn CommandStrategy + 'a> {
    if !round.is_miner(pubkey) {
        return Box::new(InvalidCommandStrategy);
    }
    match behaviour {
        Behaviour::UpdateValue | Behaviour::UpdateValueWithoutPreviousInValue => {
            if round.round_number == 1 {
                Box::new(FirstRoundStrategy::new(round, pubkey, now, behaviour))
            } else {
                Box::new(NormalBlockStrategy::new(round, pubkey, now, behaviour))
            }
        }
        Behaviour::TinyBlock => Box::new(TinyBlockStrategy::new(round, pubkey, now, params)),
        Behaviour::NextRound | Behaviour::NextTerm => {
            Box::new(TerminateRoundStrategy::new(round, pubkey, now, behaviour))
        }
        Behaviour::Nothing => Box::new(InvalidCommandStrategy),
    }
}

/// Builds the command for `behaviour`.
pub fn build_command(
    round: &Round,
    pubkey: &str,
    now: Timestamp,
    behaviour: Behaviour,
    params: CommandParameters,
) -> ConsensusCommand {
    let command = strategy_for(round, pubkey, now, behaviour, params).build();
    debug!(
        pubkey,
        round = round.round_number,
        hint = %command.hint,
        arranged = %command.arranged_mining_time,
        due = %command.mining_due_time,
        limit_ms = command.limit_ms_of_mining_block,
        "Built consensus command"
    );
    command
}
