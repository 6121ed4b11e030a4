//! Reacts to best-chain notifications by scheduling irreversible block
//! discovery on the serialized irreversible queue.

use crate::error::ConsensusResult;
use crate::irreversible::IrreversibleBlockDiscoveryService;
use crate::queue::TaskQueue;
use dposcore_core::BlockchainService;
use dposcore_types::Hash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The best chain moved to a new head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestChainFoundEvent {
    /// New best chain head
    pub block_hash: Hash,
    /// Its height
    pub block_height: u64,
    /// Blocks executed while reaching the new head
    pub executed_blocks: Vec<Hash>,
}

/// Schedules discovery and commit jobs for best-chain notifications.
pub struct BestChainFoundHandler {
    chain: Arc<dyn BlockchainService>,
    discovery: Arc<IrreversibleBlockDiscoveryService>,
    queue: TaskQueue,
}

impl BestChainFoundHandler {
    /// Creates a handler that runs its jobs on `queue`.
    pub fn new(
        chain: Arc<dyn BlockchainService>,
        discovery: Arc<IrreversibleBlockDiscoveryService>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            chain,
            discovery,
            queue,
        }
    }

    /// Queue the jobs run on.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Enqueues a discovery job for `event`. Does not wait for it.
    pub fn handle(&self, event: BestChainFoundEvent) -> ConsensusResult<()> {
        let chain = self.chain.clone();
        let discovery = self.discovery.clone();
        debug!(
            height = event.block_height,
            head = %event.block_hash,
            blocks = event.executed_blocks.len(),
            "Scheduling irreversible block discovery"
        );

        self.queue.enqueue(async move {
            let found = discovery
                .discover(chain.as_ref(), &event.executed_blocks)
                .await?;
            if let Some(index) = found {
                discovery.commit(chain.as_ref(), index).await?;
            }
            Ok(())
        })
    }

    /// Consumes notifications from `events` until the sender side closes.
    pub fn spawn_listener(self: Arc<Self>, mut events: mpsc::Receiver<BestChainFoundEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(err) = self.handle(event) {
                    warn!(error = %err, "Stopping best chain listener");
                    break;
                }
            }
            debug!("Best chain listener stopped");
        })
    }
}
