//! # Round Transition
//!
//! Pure functions that derive a new [`Round`] from the current one. Nothing
//! here mutates its input; every function returns the round that should
//! replace it.
//!
//! ```text
//! generate_first_round ──► apply_update_value / apply_tiny_block ──┐
//!                                   ▲                              │
//!                                   └── generate_next_round ◄──────┤
//!                                   └── generate_next_term  ◄──────┘
//! ```

use crate::round::{MinerInRound, Round};
use dposcore_types::{Hash, Timestamp};
use tracing::{debug, info};

/// Values a miner publishes with its `UpdateValue` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateValueInput {
    /// Commitment for this round
    pub out_value: Hash,
    /// Signature seeding next-round ordering
    pub signature: Hash,
    /// Value revealed for the previous commitment
    pub previous_in_value: Option<Hash>,
    /// Chain height at which the value is published
    pub implied_irreversible_block_height: u64,
}

/// `|value % modulus|`, the ordering primitive used for signatures.
pub fn abs_modulus(value: i64, modulus: usize) -> u32 {
    if modulus == 0 {
        return 0;
    }
    (value % modulus as i64).unsigned_abs() as u32
}

/// Builds the first round of a term from a miner list.
///
/// Miners are sorted and deduplicated, order 1 closes the round and the
/// round is flagged as following a miner-list change.
pub fn generate_first_round(
    miners: &[String],
    mining_interval_ms: u64,
    start: Timestamp,
    round_number: u64,
    term_number: u64,
) -> Round {
    let mut sorted: Vec<&String> = miners.iter().collect();
    sorted.sort();
    sorted.dedup();

    let miners = sorted
        .into_iter()
        .enumerate()
        .map(|(index, pubkey)| {
            let order = index as u32 + 1;
            let mut miner = MinerInRound::new(
                pubkey.clone(),
                order,
                start.add_millis(index as u64 * mining_interval_ms),
            );
            miner.is_extra_block_producer = order == 1;
            (pubkey.clone(), miner)
        })
        .collect();

    Round {
        round_number,
        term_number,
        miners,
        is_miner_list_just_changed: true,
        mining_interval_ms,
        ..Default::default()
    }
}

/// Records a published value for `pubkey`.
///
/// Assigns `supposed_order_of_next_round = |sig| mod N + 1`; a miner already
/// holding that final order is moved to the next free one.
pub fn apply_update_value(
    round: &Round,
    pubkey: &str,
    input: UpdateValueInput,
    now: Timestamp,
) -> Round {
    let mut next = round.clone();
    let count = next.miner_count();
    if !next.is_miner(pubkey) {
        return next;
    }

    let supposed = abs_modulus(input.signature.to_i64(), count) + 1;

    let conflicts: Vec<String> = next
        .miners
        .values()
        .filter(|m| m.pubkey != pubkey && m.final_order_of_next_round == supposed)
        .map(|m| m.pubkey.clone())
        .collect();
    for conflicted in conflicts {
        for i in supposed as usize + 1..count * 2 {
            let candidate = if i > count { (i % count) as u32 } else { i as u32 };
            if next
                .miners
                .values()
                .all(|m| m.final_order_of_next_round != candidate)
            {
                debug!(pubkey = %conflicted, from = supposed, to = candidate, "Resolved next-round order conflict");
                if let Some(miner) = next.miners.get_mut(&conflicted) {
                    miner.final_order_of_next_round = candidate;
                }
                break;
            }
        }
    }

    if let Some(miner) = next.miners.get_mut(pubkey) {
        miner.out_value = Some(input.out_value);
        miner.signature = Some(input.signature);
        miner.previous_in_value = input.previous_in_value;
        miner.implied_irreversible_block_height = input.implied_irreversible_block_height;
        miner.actual_mining_times.push(now);
        miner.produced_blocks = miner.produced_blocks.saturating_add(1);
        miner.produced_tiny_blocks = miner.produced_tiny_blocks.saturating_add(1);
        miner.supposed_order_of_next_round = supposed;
        miner.final_order_of_next_round = supposed;
    }
    next
}

/// Records a tiny block for `pubkey`.
pub fn apply_tiny_block(round: &Round, pubkey: &str, now: Timestamp) -> Round {
    let mut next = round.clone();
    if let Some(miner) = next.miners.get_mut(pubkey) {
        miner.actual_mining_times.push(now);
        miner.produced_blocks = miner.produced_blocks.saturating_add(1);
        miner.produced_tiny_blocks = miner.produced_tiny_blocks.saturating_add(1);
    }
    next
}

/// Order of the next round's extra block producer.
///
/// Derived from the signature of the lowest-ordered miner that published
/// one; `1` when nobody did.
pub fn next_extra_block_producer_order(round: &Round) -> u32 {
    round
        .miners_by_order()
        .into_iter()
        .find_map(|m| m.signature)
        .map(|sig| abs_modulus(sig.to_i64(), round.miner_count()) + 1)
        .unwrap_or(1)
}

/// Builds the round that follows `round`, closed by `terminator` at `now`.
pub fn generate_next_round(round: &Round, now: Timestamp, terminator: &str) -> Round {
    let count = round.miner_count();
    let interval = round.mining_interval();

    let mut mined: Vec<&MinerInRound> = round.mined_miners();
    mined.sort_by_key(|m| m.final_order_of_next_round);

    let mut next = Round {
        round_number: round.round_number + 1,
        term_number: round.term_number,
        mining_interval_ms: interval,
        extra_block_producer_of_previous_round: terminator.to_string(),
        confirmed_irreversible_block_height: round.confirmed_irreversible_block_height,
        confirmed_irreversible_block_round_number: round.confirmed_irreversible_block_round_number,
        ..Default::default()
    };

    let mut occupied = vec![false; count + 1];
    let mut unplaced: Vec<(&MinerInRound, bool)> = Vec::new();
    for miner in mined {
        let order = miner.final_order_of_next_round as usize;
        if order == 0 || order > count || occupied[order] {
            unplaced.push((miner, false));
            continue;
        }
        occupied[order] = true;
        next.miners.insert(
            miner.pubkey.clone(),
            carried_miner(miner, order as u32, now, interval, 0),
        );
    }
    unplaced.extend(round.not_mined_miners().into_iter().map(|m| (m, true)));

    let mut free_orders = (1..=count).filter(|o| !occupied[*o]);
    for (miner, missed) in unplaced {
        let Some(order) = free_orders.next() else {
            break;
        };
        next.miners.insert(
            miner.pubkey.clone(),
            carried_miner(miner, order as u32, now, interval, u64::from(missed)),
        );
    }

    let extra_order = next_extra_block_producer_order(round);
    let extra_key = next
        .miners
        .values()
        .find(|m| m.order == extra_order)
        .or_else(|| next.miners.values().next())
        .map(|m| m.pubkey.clone());
    if let Some(key) = extra_key {
        if let Some(miner) = next.miners.get_mut(&key) {
            miner.is_extra_block_producer = true;
        }
    }

    record_terminator(&mut next, terminator, now);
    info!(
        round = next.round_number,
        term = next.term_number,
        terminator,
        "Generated next round"
    );
    next
}

/// Builds the first round of the next term with `miners`, closed by
/// `terminator` at `now`.
pub fn generate_next_term(
    round: &Round,
    miners: &[String],
    now: Timestamp,
    terminator: &str,
) -> Round {
    let interval = round.mining_interval();
    let mut next = generate_first_round(
        miners,
        interval,
        now.add_millis(interval),
        round.round_number + 1,
        round.term_number + 1,
    );

    let mut previous: Vec<&String> = round.miners.keys().collect();
    let mut current: Vec<&String> = next.miners.keys().collect();
    previous.sort();
    current.sort();
    next.is_miner_list_just_changed = previous != current;

    for miner in next.miners.values_mut() {
        if let Some(old) = round.miner(&miner.pubkey) {
            miner.produced_blocks = old.produced_blocks;
            miner.missed_time_slots = old.missed_time_slots;
        }
    }

    next.extra_block_producer_of_previous_round = terminator.to_string();
    next.confirmed_irreversible_block_height = round.confirmed_irreversible_block_height;
    next.confirmed_irreversible_block_round_number = round.confirmed_irreversible_block_round_number;
    record_terminator(&mut next, terminator, now);

    info!(
        round = next.round_number,
        term = next.term_number,
        miners = next.miner_count(),
        changed = next.is_miner_list_just_changed,
        "Generated first round of new term"
    );
    next
}

/// Irreversible height implied by the miners who published in `current`.
///
/// Uses their implied heights recorded in `previous`, sorted ascending, and
/// picks the element at `(count - 1) / 3`. `None` below quorum.
pub fn calculate_last_irreversible_height(previous: &Round, current: &Round) -> Option<u64> {
    let mut heights: Vec<u64> = current
        .mined_miners()
        .into_iter()
        .filter_map(|m| previous.miner(&m.pubkey))
        .map(|m| m.implied_irreversible_block_height)
        .filter(|h| *h > 0)
        .collect();
    if heights.len() < current.minimum_miners_count() {
        return None;
    }
    heights.sort_unstable();
    heights.get((heights.len() - 1) / 3).copied()
}

fn carried_miner(
    miner: &MinerInRound,
    order: u32,
    now: Timestamp,
    interval: u64,
    missed: u64,
) -> MinerInRound {
    let mut next = MinerInRound::new(
        miner.pubkey.clone(),
        order,
        now.add_millis(order as u64 * interval),
    );
    next.produced_blocks = miner.produced_blocks;
    next.missed_time_slots = miner.missed_time_slots.saturating_add(missed);
    next
}

fn record_terminator(round: &mut Round, terminator: &str, now: Timestamp) {
    if let Some(miner) = round.miners.get_mut(terminator) {
        miner.actual_mining_times = vec![now];
        miner.produced_blocks = miner.produced_blocks.saturating_add(1);
        miner.produced_tiny_blocks = 1;
    }
}
