//! Integration tests for behaviour decisions and consensus commands.

use dposcore_consensus::{
    apply_update_value, build_command, calculate_last_irreversible_height, decide,
    generate_first_round, generate_next_round, Behaviour, ChainFlavor, CommandParameters,
    ConsensusCommand, MinerInRound, MiningTimeLimits, Round, UpdateValueInput,
};
use dposcore_types::{Hash, Timestamp};

const INTERVAL: u64 = 4000;
const START: u64 = 1_000_000;

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{:02x}", i + 1)).collect()
}

fn at(millis: u64) -> Timestamp {
    Timestamp::from_millis(millis)
}

fn main_chain(period_seconds: u64) -> ChainFlavor {
    ChainFlavor::Main {
        blockchain_start: at(START),
        period_seconds,
    }
}

fn signature_for_order(order: u32) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&((order - 1) as i64).to_be_bytes());
    Hash::new(bytes)
}

fn published(round: &Round, pubkey: &str, order: u32, implied: u64, now: u64) -> Round {
    apply_update_value(
        round,
        pubkey,
        UpdateValueInput {
            out_value: Hash::sha256(pubkey.as_bytes()),
            signature: signature_for_order(order),
            previous_in_value: None,
            implied_irreversible_block_height: implied,
        },
        at(now),
    )
}

fn steady_round(number: u64, n: usize, start: u64) -> Round {
    let miners = keys(n)
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let miner = MinerInRound::new(key.clone(), i as u32 + 1, at(start + i as u64 * INTERVAL));
            (key, miner)
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

fn schedule(round: &Round, pubkey: &str, now: u64, flavor: &ChainFlavor) -> ConsensusCommand {
    let params = CommandParameters::default();
    let behaviour = decide(round, pubkey, at(now), params.maximum_tiny_blocks, flavor);
    build_command(round, pubkey, at(now), behaviour, params)
}

// ============================================================================
// First round
// ============================================================================

#[test]
fn test_first_round_boot_miner_goes_after_one_interval() {
    let miners = keys(5);
    let round = generate_first_round(&miners, INTERVAL, at(START), 1, 1);
    let command = schedule(&round, &miners[0], START, &main_chain(604_800));

    assert_eq!(command.hint, Behaviour::UpdateValueWithoutPreviousInValue);
    assert_eq!(command.next_block_mining_left_ms(at(START)), 4000);
    assert_eq!(command.mining_due_time, at(START + 8000));
    assert_eq!(command.limit_ms_of_mining_block, 300);
}

#[test]
fn test_first_round_other_miners_wait_for_boot_miner() {
    let miners = keys(5);
    let round = generate_first_round(&miners, INTERVAL, at(START), 1, 1);
    let flavor = main_chain(604_800);

    let second = schedule(&round, &miners[1], START, &flavor);
    assert_eq!(second.hint, Behaviour::NextRound);
    assert_eq!(second.next_block_mining_left_ms(at(START)), 28_000);

    let last = schedule(&round, &miners[4], START, &flavor);
    assert_eq!(last.hint, Behaviour::NextRound);
    assert_eq!(last.next_block_mining_left_ms(at(START)), 40_000);
}

#[test]
fn test_first_round_after_boot_miner_published() {
    let miners = keys(5);
    let round = generate_first_round(&miners, INTERVAL, at(START), 1, 1);
    let round = published(&round, &miners[0], 1, 2, START + 4000);

    let command = schedule(&round, &miners[2], START + 4100, &main_chain(604_800));
    assert_eq!(command.hint, Behaviour::UpdateValueWithoutPreviousInValue);
    // (order + N - 1) intervals from now
    assert_eq!(command.next_block_mining_left_ms(at(START + 4100)), 7 * INTERVAL);
}

// ============================================================================
// Steady state
// ============================================================================

#[test]
fn test_non_miner_gets_invalid_command() {
    let round = steady_round(3, 4, START);
    let command = schedule(&round, "ff", START, &ChainFlavor::Side);
    assert_eq!(command, ConsensusCommand::INVALID);
    assert!(!command.is_in_window(at(START)));
}

#[test]
fn test_update_value_uses_own_slot() {
    let round = steady_round(3, 4, START);
    let key = &keys(4)[2];

    let early = schedule(&round, key, START, &ChainFlavor::Side);
    assert_eq!(early.hint, Behaviour::UpdateValue);
    assert_eq!(early.arranged_mining_time, at(START + 8000));
    assert_eq!(early.mining_due_time, at(START + 12_000));

    let inside = schedule(&round, key, START + 9000, &ChainFlavor::Side);
    assert_eq!(inside.arranged_mining_time, at(START + 9000));
    assert!(inside.is_in_window(at(START + 9000)));
}

#[test]
fn test_tiny_blocks_until_budget_runs_out() {
    let key = keys(4)[1].clone();
    let mut round = published(&steady_round(3, 4, START), &key, 2, 5, START + 4000);

    let first_tiny = schedule(&round, &key, START + 4100, &ChainFlavor::Side);
    assert_eq!(first_tiny.hint, Behaviour::TinyBlock);
    assert_eq!(first_tiny.arranged_mining_time, at(START + 4150));
    assert_eq!(first_tiny.mining_due_time, at(START + 8000));
    assert_eq!(first_tiny.limit_ms_of_mining_block, 300);

    round.miners.get_mut(&key).unwrap().produced_tiny_blocks = 7;
    let last_tiny = schedule(&round, &key, START + 6000, &ChainFlavor::Side);
    assert_eq!(last_tiny.hint, Behaviour::TinyBlock);
    assert_eq!(last_tiny.limit_ms_of_mining_block, 250);

    round.miners.get_mut(&key).unwrap().produced_tiny_blocks = 8;
    let done = schedule(&round, &key, START + 6000, &ChainFlavor::Side);
    assert_eq!(done.hint, Behaviour::NextRound);
    assert!(done.arranged_mining_time > at(START + 6000));
}

#[test]
fn test_missed_slot_moves_to_next_round_slot() {
    let round = steady_round(3, 4, START);
    let key = &keys(4)[1];
    let now = START + 30_000;

    let command = schedule(&round, key, now, &ChainFlavor::Side);
    assert_eq!(command.hint, Behaviour::NextRound);
    // Round length is (4 + 1) * 4000, so the next full round starts at +40000.
    assert_eq!(command.arranged_mining_time, at(START + 40_000 + INTERVAL));
}

#[test]
fn test_extra_block_producer_keeps_extra_slot() {
    let mut round = steady_round(3, 4, START);
    let key = keys(4)[0].clone();
    round.miners.get_mut(&key).unwrap().is_extra_block_producer = true;
    let round = published(&round, &key, 1, 5, START);

    let now = START + 16_500;
    let command = schedule(&round, &key, now, &ChainFlavor::Side);
    assert_eq!(command.hint, Behaviour::NextRound);
    assert_eq!(command.arranged_mining_time, round.extra_block_mining_time());
}

// ============================================================================
// Terms
// ============================================================================

#[test]
fn test_main_chain_changes_term_once_quorum_crossed_boundary() {
    let miners = keys(3);
    let mut round = steady_round(4, 3, START + 20_000);
    for (i, key) in miners.iter().enumerate() {
        round = published(&round, key, i as u32 + 1, 10, START + 20_000 + i as u64 * INTERVAL);
    }

    let now = START + 40_000;
    let command = schedule(&round, &miners[0], now, &main_chain(10));
    assert_eq!(command.hint, Behaviour::NextTerm);
    assert_eq!(
        command.limit_ms_of_mining_block,
        MiningTimeLimits::new(INTERVAL).last_block_of_current_term_mining_limit_ms
    );

    // Long terms keep the round going.
    let command = schedule(&round, &miners[0], now, &main_chain(604_800));
    assert_eq!(command.hint, Behaviour::NextRound);
}

#[test]
fn test_term_change_quorum_boundary() {
    // Five miners need a quorum of four.
    let miners = keys(5);
    let mut round = steady_round(6, 5, START + 20_000);
    for (i, key) in miners.iter().enumerate() {
        round = published(&round, key, i as u32 + 1, 10, START + 20_000 + i as u64 * INTERVAL);
    }
    let flavor = main_chain(25);
    assert_eq!(round.minimum_miners_count(), 4);

    // Only the last three miners produced after the 25s boundary.
    assert_eq!(flavor.terminate_round(&round), Behaviour::NextRound);

    let mut crossed = round.clone();
    crossed
        .miners
        .get_mut(&miners[1])
        .unwrap()
        .actual_mining_times
        .push(at(START + 26_000));
    assert_eq!(flavor.terminate_round(&crossed), Behaviour::NextTerm);
}

#[test]
fn test_side_chain_never_changes_term() {
    let miners = keys(3);
    let mut round = steady_round(4, 3, START + 20_000);
    for (i, key) in miners.iter().enumerate() {
        round = published(&round, key, i as u32 + 1, 10, START + 20_000 + i as u64 * INTERVAL);
    }
    let command = schedule(&round, &miners[0], START + 40_000, &ChainFlavor::Side);
    assert_eq!(command.hint, Behaviour::NextRound);
}

// ============================================================================
// Irreversible height
// ============================================================================

#[test]
fn test_irreversible_height_needs_quorum() {
    let miners = keys(4);
    let mut previous = steady_round(3, 4, START);
    for (i, key) in miners.iter().enumerate() {
        previous = published(&previous, key, i as u32 + 1, 100 + i as u64 * 10, START + i as u64 * INTERVAL);
    }
    let next_start = START + 20_000;
    let mut current = generate_next_round(&previous, at(next_start), &miners[0]);

    // Quorum of 4 is 3.
    for key in miners.iter().take(2) {
        let order = current.miner(key).unwrap().order;
        current = published(&current, key, order, 200, next_start + 100);
    }
    assert_eq!(calculate_last_irreversible_height(&previous, &current), None);

    let order = current.miner(&miners[2]).unwrap().order;
    current = published(&current, &miners[2], order, 200, next_start + 200);
    // Heights 100, 110, 120: index (3 - 1) / 3 = 0.
    assert_eq!(calculate_last_irreversible_height(&previous, &current), Some(100));

    let order = current.miner(&miners[3]).unwrap().order;
    current = published(&current, &miners[3], order, 200, next_start + 300);
    // Heights 100, 110, 120, 130: index (4 - 1) / 3 = 1.
    assert_eq!(calculate_last_irreversible_height(&previous, &current), Some(110));
}

#[test]
fn test_next_round_slots_follow_terminator() {
    let miners = keys(4);
    let mut round = steady_round(3, 4, START);
    for (i, key) in miners.iter().enumerate() {
        // Everybody asks for order 2; conflicts push earlier claimants onward.
        round = published(&round, key, 2, 50, START + i as u64 * INTERVAL);
    }
    let now = START + 17_000;
    let next = generate_next_round(&round, at(now), &miners[0]);

    next.validate().unwrap();
    assert_eq!(next.round_number, 4);
    assert_eq!(next.round_start_time(), at(now + INTERVAL));
    assert_eq!(next.extra_block_producer_of_previous_round, miners[0]);
    // Order 1 now belongs to a miner whose signature maps to order 2.
    assert_eq!(next.extra_block_producer().map(|m| m.order), Some(2));

    let terminator = next.miner(&miners[0]).unwrap();
    assert_eq!(terminator.actual_mining_times, vec![at(now)]);
    assert_eq!(terminator.produced_tiny_blocks, 1);
}
