//! Integration tests for irreversible block discovery and the best-chain handler.

use dposcore_config::{CandidateOrder, IrreversibleConfig};
use dposcore_consensus::{
    BestChainFoundEvent, BestChainFoundHandler, IrreversibleBlockDiscoveryService,
    IrreversibleBlockFound, IrreversibleBlockIndex, TaskQueue, IRREVERSIBLE_BLOCK_FOUND_EVENT,
};
use dposcore_core::memory::{InMemoryBlockchain, InMemoryTransactionResults, StaticAddressResolver};
use dposcore_core::BlockchainService;
use dposcore_types::{
    Address, Block, BlockHeader, Bloom, Hash, LogEvent, Timestamp, TransactionResult,
    TransactionResultStatus, GENESIS_BLOCK_HEIGHT,
};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Fixture {
    chain: Arc<InMemoryBlockchain>,
    results: Arc<InMemoryTransactionResults>,
    hashes: Vec<Hash>,
}

impl Fixture {
    /// A chain holding only genesis.
    fn new() -> Self {
        let chain = Arc::new(InMemoryBlockchain::new());
        let genesis = Block::new(
            BlockHeader::new(1, GENESIS_BLOCK_HEIGHT, Timestamp::ZERO, Hash::ZERO),
            Vec::new(),
        );
        let hash = chain.append_block(genesis).unwrap();
        Self {
            chain,
            results: Arc::new(InMemoryTransactionResults::new()),
            hashes: vec![hash],
        }
    }

    fn tip(&self) -> Hash {
        *self.hashes.last().unwrap()
    }

    /// Appends a block whose single transaction emits `logs`.
    fn push(&mut self, logs: Vec<LogEvent>, store_result: bool) -> Hash {
        let height = self.chain.best_height() + 1;
        let blooms: Vec<Bloom> = logs.iter().map(LogEvent::bloom).collect();
        let mut header = BlockHeader::new(1, height, Timestamp::from_secs(height), self.tip());
        header.bloom = Bloom::combine_all(&blooms);
        let tx_id = Hash::sha256(&height.to_be_bytes());
        let hash = self.chain.append_block(Block::new(header, vec![tx_id])).unwrap();
        if store_result {
            self.results
                .insert(TransactionResult::mined(tx_id, hash, height, logs));
        }
        self.hashes.push(hash);
        hash
    }

    fn push_empty(&mut self, count: usize) {
        for _ in 0..count {
            self.push(Vec::new(), true);
        }
    }

    fn push_marker(&mut self, offset: u64) -> Hash {
        self.push(vec![marker("Consensus", offset)], true)
    }

    fn hash_at(&self, height: u64) -> Hash {
        self.hashes[(height - GENESIS_BLOCK_HEIGHT) as usize]
    }

    fn discovery(&self, order: CandidateOrder) -> IrreversibleBlockDiscoveryService {
        let resolver = StaticAddressResolver::with_system_contracts(["Consensus"]);
        let config = IrreversibleConfig {
            candidate_order: order,
            ..Default::default()
        };
        IrreversibleBlockDiscoveryService::new(&resolver, self.results.clone(), &config).unwrap()
    }
}

fn marker(contract: &str, offset: u64) -> LogEvent {
    LogEvent::new(
        Address::from_name(contract),
        IRREVERSIBLE_BLOCK_FOUND_EVENT,
        IrreversibleBlockFound { offset }.to_bytes(),
    )
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_marker_advances_irreversible_height() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let block = fx.push_marker(3);
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    let found = service.discover(fx.chain.as_ref(), &[block]).await.unwrap();
    assert_eq!(
        found,
        Some(IrreversibleBlockIndex {
            height: 3,
            hash: fx.hash_at(3),
        })
    );

    assert!(service.commit(fx.chain.as_ref(), found.unwrap()).await.unwrap());
    assert_eq!(fx.chain.irreversible_height(), 3);

    // Committing the same index again leaves the pointer alone.
    assert!(!service.commit(fx.chain.as_ref(), found.unwrap()).await.unwrap());
    assert_eq!(fx.chain.irreversible_height(), 3);
}

#[tokio::test]
async fn test_discovery_without_commit_is_repeatable() {
    let mut fx = Fixture::new();
    fx.push_empty(3);
    let a = fx.push_marker(2);
    let b = fx.push_marker(1);
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    let first = service.candidate_heights(fx.chain.as_ref(), &[a, b]).await;
    let second = service.candidate_heights(fx.chain.as_ref(), &[a, b]).await;
    assert_eq!(first, vec![3, 5]);
    assert_eq!(first, second);

    let found = service.discover(fx.chain.as_ref(), &[a, b]).await.unwrap();
    assert_eq!(found, service.discover(fx.chain.as_ref(), &[a, b]).await.unwrap());
    assert_eq!(fx.chain.irreversible_height(), GENESIS_BLOCK_HEIGHT);
}

#[tokio::test]
async fn test_stale_candidates_are_dropped() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let service = fx.discovery(CandidateOrder::AsDiscovered);
    let first = fx.push_marker(2);
    let index = service.discover(fx.chain.as_ref(), &[first]).await.unwrap().unwrap();
    service.commit(fx.chain.as_ref(), index).await.unwrap();
    assert_eq!(fx.chain.irreversible_height(), 4);

    // Points at height 3, below the irreversible height.
    let stale = fx.push_marker(4);
    assert_eq!(service.discover(fx.chain.as_ref(), &[stale]).await.unwrap(), None);
    assert_eq!(fx.chain.irreversible_height(), 4);
}

#[tokio::test]
async fn test_irreversible_height_never_decreases() {
    let mut fx = Fixture::new();
    fx.push_empty(8);
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    let high = fx.push_marker(1);
    let index = service.discover(fx.chain.as_ref(), &[high]).await.unwrap().unwrap();
    assert!(service.commit(fx.chain.as_ref(), index).await.unwrap());
    assert_eq!(fx.chain.irreversible_height(), 9);

    let low = IrreversibleBlockIndex {
        height: 5,
        hash: fx.hash_at(5),
    };
    assert!(!service.commit(fx.chain.as_ref(), low).await.unwrap());
    assert_eq!(fx.chain.irreversible_height(), 9);
}

#[tokio::test]
async fn test_candidate_order() {
    let mut fx = Fixture::new();
    fx.push_empty(6);
    let low = fx.push_marker(4);
    let high = fx.push_marker(2);
    let batch = [low, high];

    let as_discovered = fx.discovery(CandidateOrder::AsDiscovered);
    let found = as_discovered.discover(fx.chain.as_ref(), &batch).await.unwrap();
    assert_eq!(found.map(|i| i.height), Some(4));

    let highest = fx.discovery(CandidateOrder::HighestFirst);
    let found = highest.discover(fx.chain.as_ref(), &batch).await.unwrap();
    assert_eq!(found.map(|i| i.height), Some(7));
}

#[tokio::test]
async fn test_foreign_markers_are_ignored() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let foreign = fx.push(vec![marker("Token", 2)], true);
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    assert!(service
        .candidate_heights(fx.chain.as_ref(), &[foreign])
        .await
        .is_empty());
    assert_eq!(service.discover(fx.chain.as_ref(), &[foreign]).await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_data_is_skipped() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let without_result = fx.push(vec![marker("Consensus", 2)], false);
    let unknown = Hash::sha256(b"not a block");
    let good = fx.push_marker(3);
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    let heights = service
        .candidate_heights(fx.chain.as_ref(), &[unknown, without_result, good])
        .await;
    assert_eq!(heights, vec![4]);
}

#[tokio::test]
async fn test_failed_transactions_are_skipped() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let logs = vec![marker("Consensus", 2)];
    let block = fx.push(logs.clone(), false);
    let height = fx.chain.best_height();
    let tx_id = fx.chain.get_block_by_hash(&block).await.unwrap().unwrap().transaction_ids[0];
    fx.results.insert(TransactionResult {
        status: TransactionResultStatus::Failed,
        ..TransactionResult::mined(tx_id, block, height, logs)
    });
    let service = fx.discovery(CandidateOrder::AsDiscovered);

    let header = fx.chain.get_block_by_hash(&block).await.unwrap().unwrap().header;
    assert!(service.marker_bloom().is_in(&header.bloom));
    assert!(service
        .candidate_heights(fx.chain.as_ref(), &[block])
        .await
        .is_empty());
    assert_eq!(service.discover(fx.chain.as_ref(), &[block]).await.unwrap(), None);
}

// ============================================================================
// Best chain handler
// ============================================================================

#[tokio::test]
async fn test_handler_commits_on_queue() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let block = fx.push_marker(2);
    let handler = BestChainFoundHandler::new(
        fx.chain.clone(),
        Arc::new(fx.discovery(CandidateOrder::AsDiscovered)),
        TaskQueue::start("IrreversibleBlockQueue"),
    );

    handler
        .handle(BestChainFoundEvent {
            block_hash: block,
            block_height: 6,
            executed_blocks: vec![block],
        })
        .unwrap();
    handler.queue().wait_idle().await.unwrap();

    assert_eq!(fx.chain.irreversible_height(), 4);
    assert_eq!(handler.queue().completed(), 1);
}

#[tokio::test]
async fn test_repeated_notifications_are_harmless() {
    let mut fx = Fixture::new();
    fx.push_empty(4);
    let block = fx.push_marker(2);
    let handler = Arc::new(BestChainFoundHandler::new(
        fx.chain.clone(),
        Arc::new(fx.discovery(CandidateOrder::AsDiscovered)),
        TaskQueue::start("IrreversibleBlockQueue"),
    ));

    let (sender, receiver) = mpsc::channel(8);
    let listener = handler.clone().spawn_listener(receiver);
    for _ in 0..3 {
        sender
            .send(BestChainFoundEvent {
                block_hash: block,
                block_height: 6,
                executed_blocks: vec![block],
            })
            .await
            .unwrap();
    }
    drop(sender);
    listener.await.unwrap();
    handler.queue().wait_idle().await.unwrap();

    assert_eq!(handler.queue().completed(), 3);
    let head = fx.chain.get_chain().await.unwrap();
    assert_eq!(head.last_irreversible_block_height, 4);
    assert_eq!(head.last_irreversible_block_hash, fx.hash_at(4));
}
