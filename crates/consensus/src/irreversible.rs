//! # Irreversible Block Discovery
//!
//! Scans newly executed blocks for the finality marker emitted by the
//! consensus contract and advances the chain's irreversible pointer.
//!
//! ```text
//! block bloom ⊇ marker? ──no──► skip block
//!        │yes
//! tx result mined and bloom ⊇ marker? ──no──► skip tx
//!        │yes
//! log from consensus contract named IrreversibleBlockFound
//!        │
//! candidate = block height - offset
//! ```
//!
//! Missing blocks or results are logged and skipped; they are usually just
//! not persisted yet and the next trigger picks them up.

use crate::error::{ConsensusError, ConsensusResult};
use crate::wire::{IrreversibleBlockFound, IRREVERSIBLE_BLOCK_FOUND_EVENT};
use dposcore_config::{CandidateOrder, IrreversibleConfig};
use dposcore_core::{BlockchainService, ContractAddressResolver, TransactionResultQuery};
use dposcore_types::{Address, Block, Bloom, Hash, LogEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A block to be marked irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrreversibleBlockIndex {
    /// Block height
    pub height: u64,
    /// Block hash on the best chain
    pub hash: Hash,
}

/// Finds irreversible block candidates in executed blocks.
pub struct IrreversibleBlockDiscoveryService {
    results: Arc<dyn TransactionResultQuery>,
    consensus_address: Address,
    marker_bloom: Bloom,
    candidate_order: CandidateOrder,
}

impl IrreversibleBlockDiscoveryService {
    /// Creates the service, resolving the consensus contract and building
    /// the marker bloom up front.
    pub fn new(
        resolver: &dyn ContractAddressResolver,
        results: Arc<dyn TransactionResultQuery>,
        config: &IrreversibleConfig,
    ) -> ConsensusResult<Self> {
        let consensus_address = resolver
            .resolve(&config.consensus_contract_name)
            .ok_or_else(|| ConsensusError::UnknownContract(config.consensus_contract_name.clone()))?;
        let marker_bloom =
            LogEvent::new(consensus_address, IRREVERSIBLE_BLOCK_FOUND_EVENT, Vec::new()).bloom();

        Ok(Self {
            results,
            consensus_address,
            marker_bloom,
            candidate_order: config.candidate_order,
        })
    }

    /// Bloom of the finality marker.
    pub fn marker_bloom(&self) -> &Bloom {
        &self.marker_bloom
    }

    /// How candidates are chosen.
    pub fn candidate_order(&self) -> CandidateOrder {
        self.candidate_order
    }

    /// Looks for an irreversible block among `block_hashes`.
    ///
    /// Candidates at or below the current irreversible height, above the best
    /// chain height, or not on the best chain are dropped.
    pub async fn discover(
        &self,
        chain: &dyn BlockchainService,
        block_hashes: &[Hash],
    ) -> ConsensusResult<Option<IrreversibleBlockIndex>> {
        let head = chain.get_chain().await?;
        let mut candidates: Vec<u64> = self
            .candidate_heights(chain, block_hashes)
            .await
            .into_iter()
            .filter(|h| *h > head.last_irreversible_block_height && *h <= head.best_chain_height)
            .collect();

        if self.candidate_order == CandidateOrder::HighestFirst {
            candidates.sort_unstable_by(|a, b| b.cmp(a));
        }

        for height in candidates {
            match chain.get_block_hash_by_height(height).await? {
                Some(hash) => {
                    debug!(height, hash = %hash, "Found irreversible block candidate");
                    return Ok(Some(IrreversibleBlockIndex { height, hash }));
                }
                None => warn!(height, "Irreversible candidate not on best chain"),
            }
        }
        Ok(None)
    }

    /// Marks `index` irreversible. Returns whether the pointer moved.
    pub async fn commit(
        &self,
        chain: &dyn BlockchainService,
        index: IrreversibleBlockIndex,
    ) -> ConsensusResult<bool> {
        let advanced = chain.set_irreversible(index.height, index.hash).await?;
        if advanced {
            info!(height = index.height, hash = %index.hash, "Irreversible block advanced");
        } else {
            debug!(height = index.height, "Irreversible pointer unchanged");
        }
        Ok(advanced)
    }

    /// Candidate heights in scan order.
    pub async fn candidate_heights(
        &self,
        chain: &dyn BlockchainService,
        block_hashes: &[Hash],
    ) -> Vec<u64> {
        let mut heights = Vec::new();
        for block_hash in block_hashes {
            let block = match chain.get_block_by_hash(block_hash).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    warn!(hash = %block_hash, "Block not found during irreversible discovery");
                    continue;
                }
                Err(err) => {
                    warn!(hash = %block_hash, error = %err, "Block lookup failed during irreversible discovery");
                    continue;
                }
            };
            if !self.marker_bloom.is_in(&block.header.bloom) {
                continue;
            }
            self.scan_block(&block, *block_hash, &mut heights).await;
        }
        heights
    }

    async fn scan_block(&self, block: &Block, block_hash: Hash, heights: &mut Vec<u64>) {
        for tx_id in &block.transaction_ids {
            let result = match self.results.get_transaction_result(tx_id, &block_hash).await {
                Ok(Some(result)) => result,
                Ok(None) => {
                    warn!(tx = %tx_id, block = block.height(), "Transaction result not found");
                    continue;
                }
                Err(err) => {
                    warn!(tx = %tx_id, error = %err, "Transaction result lookup failed");
                    continue;
                }
            };
            if !result.is_mined() || !self.marker_bloom.is_in(&result.bloom) {
                continue;
            }

            for log in &result.logs {
                if log.address != self.consensus_address || log.name != IRREVERSIBLE_BLOCK_FOUND_EVENT {
                    continue;
                }
                match IrreversibleBlockFound::from_bytes(&log.data) {
                    Ok(marker) => match block.height().checked_sub(marker.offset) {
                        Some(height) => heights.push(height),
                        None => warn!(offset = marker.offset, block = block.height(), "Marker offset below genesis"),
                    },
                    Err(err) => warn!(tx = %tx_id, error = %err, "Malformed finality marker"),
                }
            }
        }
    }
}
