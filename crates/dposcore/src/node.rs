//! # Simulated Network
//!
//! Runs every configured miner in one process against a shared in-memory
//! chain and consensus contract, on a simulated clock.
//!
//! Each step:
//!
//! 1. every miner triggers consensus on the current head;
//! 2. the miner with the earliest arranged mining time produces a block;
//! 3. the block is validated, applied to the contract and appended;
//! 4. a best-chain notification drives irreversible block discovery.

use crate::block_builder::{BlockBuilder, BlockBuilderConfig, BlockTemplate};
use anyhow::{anyhow, bail, Context, Result};
use dposcore_config::Config;
use dposcore_consensus::{
    generate_first_round, Behaviour, BestChainFoundEvent, BestChainFoundHandler, ConsensusCommand,
    ConsensusService, HeaderInformation, InMemoryConsensusContract,
    IrreversibleBlockDiscoveryService, TaskQueueManager,
};
use dposcore_core::memory::{
    DeterministicSigner, InMemoryBlockchain, InMemoryTransactionResults, StaticAddressResolver,
};
use dposcore_core::{BlockchainService, ChainContext, ContractAddressResolver, Signer};
use dposcore_types::{Hash, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Seed of the `index`-th simulated miner's signer.
pub fn miner_seed(index: usize) -> String {
    format!("miner-{index}")
}

/// Public keys of `count` simulated miners.
pub fn simulated_miner_keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| DeterministicSigner::from_seed(miner_seed(i).as_bytes()).public_key().to_hex())
        .collect()
}

/// One produced block, as reported by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedBlock {
    /// Block height
    pub height: u64,
    /// Block hash
    pub hash: Hash,
    /// Production time
    pub time: Timestamp,
    /// Producing miner
    pub miner: String,
    /// Behaviour carried out
    pub behaviour: Behaviour,
    /// Round the block belongs to after it was applied
    pub round_number: u64,
    /// Term the block belongs to after it was applied
    pub term_number: u64,
    /// Irreversible height after discovery ran
    pub irreversible_height: u64,
}

struct Miner {
    signer: Arc<DeterministicSigner>,
    service: ConsensusService,
}

/// All miners of a chain in one process.
pub struct SimulatedNetwork {
    chain: Arc<InMemoryBlockchain>,
    results: Arc<InMemoryTransactionResults>,
    contract: Arc<InMemoryConsensusContract>,
    builder: BlockBuilder,
    miners: Vec<Miner>,
    handler: Arc<BestChainFoundHandler>,
    events: mpsc::Sender<BestChainFoundEvent>,
    listener: JoinHandle<()>,
    queues: TaskQueueManager,
    queue_name: String,
    now: Timestamp,
}

impl SimulatedNetwork {
    /// Builds a network for `config`, whose miners must be the keys of
    /// [`simulated_miner_keys`]. Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let consensus = &config.consensus;
        let miners = consensus.normalized_miners();

        let signers: Vec<Arc<DeterministicSigner>> = (0..miners.len())
            .map(|i| Arc::new(DeterministicSigner::from_seed(miner_seed(i).as_bytes())))
            .collect();
        for signer in &signers {
            let key = signer.public_key().to_hex();
            if !miners.contains(&key) {
                bail!("configured miners do not match the simulated keys (missing {key})");
            }
        }

        let resolver = StaticAddressResolver::with_system_contracts([
            config.irreversible.consensus_contract_name.as_str(),
        ]);
        let consensus_address = resolver
            .resolve(&config.irreversible.consensus_contract_name)
            .ok_or_else(|| anyhow!("consensus contract not registered"))?;

        let start = Timestamp::from_millis(consensus.blockchain_start_ms);
        let first_round = generate_first_round(
            &miners,
            consensus.mining_interval_ms,
            start.add_millis(consensus.mining_interval_ms),
            1,
            1,
        );
        let contract = Arc::new(InMemoryConsensusContract::new(consensus_address, first_round, start));

        let builder = BlockBuilder::new(BlockBuilderConfig {
            chain_id: config.chain.chain_id,
            consensus_address,
        });
        let chain = Arc::new(InMemoryBlockchain::new());
        chain
            .append_block(builder.build_genesis(start))
            .context("appending genesis")?;
        let results = Arc::new(InMemoryTransactionResults::new());

        let discovery = Arc::new(IrreversibleBlockDiscoveryService::new(
            &resolver,
            results.clone(),
            &config.irreversible,
        )?);
        let queues = TaskQueueManager::new();
        let queue_name = config.irreversible.queue_name.clone();
        let handler = Arc::new(BestChainFoundHandler::new(
            chain.clone(),
            discovery,
            queues.queue(&queue_name),
        ));
        let (events, receiver) = mpsc::channel(64);
        let listener = handler.clone().spawn_listener(receiver);

        let miners = signers
            .into_iter()
            .map(|signer| Miner {
                service: ConsensusService::new(
                    config.chain.flavor,
                    consensus,
                    signer.clone(),
                    contract.clone(),
                ),
                signer,
            })
            .collect();

        info!(
            chain_id = config.chain.chain_id,
            flavor = ?config.chain.flavor,
            miners = consensus.initial_miners.len(),
            interval_ms = consensus.mining_interval_ms,
            "Simulated network ready"
        );

        Ok(Self {
            chain,
            results,
            contract,
            builder,
            miners,
            handler,
            events,
            listener,
            queues,
            queue_name,
            now: start,
        })
    }

    /// Current simulated time.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Shared chain.
    pub fn chain(&self) -> &Arc<InMemoryBlockchain> {
        &self.chain
    }

    /// Shared consensus contract.
    pub fn contract(&self) -> &Arc<InMemoryConsensusContract> {
        &self.contract
    }

    /// Produces the next block.
    pub async fn step(&mut self) -> Result<ProducedBlock> {
        let head = self.chain.get_chain().await?;
        let ctx = ChainContext::from(head);

        let mut chosen: Option<(usize, ConsensusCommand)> = None;
        for (index, miner) in self.miners.iter().enumerate() {
            let command = miner.service.trigger_consensus(&ctx, self.now).await?;
            if command.is_invalid() {
                continue;
            }
            let earlier = chosen.map_or(true, |(_, best)| {
                command.arranged_mining_time < best.arranged_mining_time
            });
            if earlier {
                chosen = Some((index, command));
            }
        }
        let (index, command) = chosen.ok_or_else(|| anyhow!("no miner may produce a block"))?;
        let time = self.now.max(command.arranged_mining_time);
        let miner = &self.miners[index];

        let extra = miner
            .service
            .get_information_to_update_consensus(&ctx, time)
            .await?;
        let info = HeaderInformation::from_bytes(&extra)?;
        let pubkey = miner.signer.public_key();
        let mut template = BlockTemplate {
            parent_hash: ctx.block_hash,
            parent_height: ctx.block_height,
            time,
            miner_pubkey: pubkey.as_bytes(),
            behaviour: info.behaviour,
            consensus_extra_data: extra,
            logs: Vec::new(),
        };

        let draft = self.builder.build_block(template.clone());
        if !miner.service.validate_before_execute(&draft.block).await? {
            bail!("block {} rejected before execution", draft.block.height());
        }
        template.logs = self
            .contract
            .process_consensus_information(&info, ctx.block_height + 1);
        let built = self.builder.build_block(template);
        if !miner.service.validate_after_execute(&built.block).await? {
            bail!("block {} rejected after execution", built.block.height());
        }

        for result in built.results {
            self.results.insert(result);
        }
        let hash = self.chain.append_block(built.block.clone())?;
        self.now = time;

        self.events
            .send(BestChainFoundEvent {
                block_hash: hash,
                block_height: built.block.height(),
                executed_blocks: vec![hash],
            })
            .await
            .map_err(|_| anyhow!("best chain listener stopped"))?;
        self.handler.queue().wait_idle().await?;

        let round = self.contract.current_round();
        let produced = ProducedBlock {
            height: built.block.height(),
            hash,
            time,
            miner: miner.service.pubkey().to_string(),
            behaviour: info.behaviour,
            round_number: round.round_number,
            term_number: round.term_number,
            irreversible_height: self.chain.irreversible_height(),
        };
        debug!(
            height = produced.height,
            behaviour = %produced.behaviour,
            round = produced.round_number,
            lib = produced.irreversible_height,
            "Produced block"
        );
        Ok(produced)
    }

    /// Produces `blocks` blocks.
    pub async fn run(&mut self, blocks: usize) -> Result<Vec<ProducedBlock>> {
        let mut produced = Vec::with_capacity(blocks);
        for _ in 0..blocks {
            produced.push(self.step().await?);
        }
        if let Some(last) = produced.last() {
            info!(
                height = last.height,
                round = last.round_number,
                term = last.term_number,
                lib = last.irreversible_height,
                queues = ?self.queues.names(),
                "Simulation finished"
            );
        }
        Ok(produced)
    }

    /// Stops the best-chain listener.
    pub async fn shutdown(self) {
        debug!(queue = %self.queue_name, "Shutting down simulated network");
        drop(self.events);
        let _ = self.listener.await;
    }
}
