//! End-to-end tests running every miner in one process.

use dposcore::{simulated_miner_keys, ProducedBlock, SimulatedNetwork};
use dposcore_config::{ChainKind, Config};
use dposcore_consensus::Behaviour;
use dposcore_core::BlockchainService;

const START_MS: u64 = 1_700_000_000_000;

fn config(miners: usize, flavor: ChainKind, period_seconds: u64) -> Config {
    let mut config = Config::default();
    config.chain.flavor = flavor;
    config.consensus.initial_miners = simulated_miner_keys(miners);
    config.consensus.blockchain_start_ms = START_MS;
    config.consensus.period_seconds = period_seconds;
    config
}

fn assert_heights_consecutive(blocks: &[ProducedBlock]) {
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].height, pair[0].height + 1);
        assert!(pair[1].time >= pair[0].time);
    }
}

#[tokio::test]
async fn test_irreversible_height_advances() {
    let mut network = SimulatedNetwork::new(&config(5, ChainKind::Main, 604_800)).unwrap();
    let blocks = network.run(160).await.unwrap();

    assert_eq!(blocks.first().map(|b| b.height), Some(2));
    assert_heights_consecutive(&blocks);

    let mut last_lib = 0;
    for block in &blocks {
        assert!(block.irreversible_height >= last_lib, "irreversible height went backwards");
        assert!(block.irreversible_height <= block.height);
        last_lib = block.irreversible_height;
    }
    assert!(last_lib > 1, "irreversible height never left genesis");

    let head = network.chain().get_chain().await.unwrap();
    assert_eq!(head.last_irreversible_block_height, last_lib);
    assert_eq!(head.best_chain_height, blocks.last().unwrap().height);
    network.shutdown().await;
}

#[tokio::test]
async fn test_rounds_progress_with_all_behaviours() {
    let mut network = SimulatedNetwork::new(&config(3, ChainKind::Side, 604_800)).unwrap();
    let blocks = network.run(80).await.unwrap();

    assert_eq!(blocks[0].behaviour, Behaviour::UpdateValueWithoutPreviousInValue);
    for behaviour in [Behaviour::UpdateValue, Behaviour::TinyBlock, Behaviour::NextRound] {
        assert!(
            blocks.iter().any(|b| b.behaviour == behaviour),
            "no {behaviour} block produced"
        );
    }
    assert!(blocks.iter().all(|b| b.behaviour != Behaviour::NextTerm));
    assert!(blocks.iter().all(|b| b.term_number == 1));

    let rounds: Vec<u64> = blocks.iter().map(|b| b.round_number).collect();
    assert!(rounds.windows(2).all(|w| w[1] >= w[0]));
    assert!(*rounds.last().unwrap() >= 3);

    let round = network.contract().current_round();
    round.validate().unwrap();
    network.shutdown().await;
}

#[tokio::test]
async fn test_short_period_changes_term() {
    let mut network = SimulatedNetwork::new(&config(3, ChainKind::Main, 30)).unwrap();
    let blocks = network.run(120).await.unwrap();

    let first_term_change = blocks
        .iter()
        .position(|b| b.behaviour == Behaviour::NextTerm)
        .expect("no term change produced");
    assert_eq!(blocks[first_term_change].term_number, 2);
    assert!(blocks[..first_term_change].iter().all(|b| b.term_number == 1));
    assert_eq!(network.contract().current_round().miner_count(), 3);
    network.shutdown().await;
}

#[tokio::test]
async fn test_single_miner_never_changes_term() {
    let mut network = SimulatedNetwork::new(&config(1, ChainKind::Main, 30)).unwrap();
    let blocks = network.run(60).await.unwrap();

    assert!(blocks.iter().all(|b| b.behaviour != Behaviour::NextTerm));
    assert!(blocks.iter().any(|b| b.behaviour == Behaviour::NextRound));
    network.shutdown().await;
}

#[tokio::test]
async fn test_mismatched_miners_are_rejected() {
    let mut config = config(3, ChainKind::Main, 604_800);
    config.consensus.initial_miners[1] = "04abcdef".to_string();
    assert!(SimulatedNetwork::new(&config).is_err());
}

#[tokio::test]
async fn test_saved_configuration_drives_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(dposcore::DEFAULT_CONFIG_FILE);
    config(4, ChainKind::Side, 604_800).save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.consensus.initial_miners, simulated_miner_keys(4));

    let mut network = SimulatedNetwork::new(&loaded).unwrap();
    let blocks = network.run(10).await.unwrap();
    assert_eq!(blocks.len(), 10);
    assert_eq!(network.chain().best_height(), 11);
    network.shutdown().await;
}
