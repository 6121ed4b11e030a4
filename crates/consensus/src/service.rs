//! # Consensus Service
//!
//! Glue between the mining loop, the block pipeline and the consensus
//! contract:
//!
//! 1. [`ConsensusService::trigger_consensus`] reads the current round,
//!    decides a behaviour and caches the resulting command.
//! 2. [`ConsensusService::get_information_to_update_consensus`] turns the
//!    cached command into header extra data for the block being produced.
//! 3. [`ConsensusService::validate_before_execute`] and
//!    [`ConsensusService::validate_after_execute`] check incoming blocks.

use crate::behaviour::{decide, ChainFlavor};
use crate::command::{build_command, CommandParameters, ConsensusCommand};
use crate::error::{ConsensusError, ConsensusResult};
use crate::round::Round;
use crate::trigger::TriggerInformationProvider;
use crate::wire::{TriggerInformation, CONSENSUS_EXTRA_DATA_KEY};
use dposcore_config::{ChainKind, ConsensusConfig};
use dposcore_core::{ChainContext, ConsensusContractReader, Signer};
use dposcore_types::{Block, BlockHeader, Timestamp};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-node consensus entry point.
pub struct ConsensusService {
    pubkey: String,
    reader: Arc<dyn ConsensusContractReader>,
    trigger: TriggerInformationProvider,
    flavor: ChainFlavor,
    params: CommandParameters,
    command: RwLock<Option<ConsensusCommand>>,
}

impl ConsensusService {
    /// Creates a service for the miner behind `signer`.
    pub fn new(
        kind: ChainKind,
        config: &ConsensusConfig,
        signer: Arc<dyn Signer>,
        reader: Arc<dyn ConsensusContractReader>,
    ) -> Self {
        let trigger = TriggerInformationProvider::new(signer);
        Self {
            pubkey: trigger.pubkey(),
            reader,
            trigger,
            flavor: ChainFlavor::from_config(kind, config),
            params: CommandParameters::from(config),
            command: RwLock::new(None),
        }
    }

    /// Hex public key of the local miner.
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// The command computed by the last [`Self::trigger_consensus`].
    pub fn current_command(&self) -> Option<ConsensusCommand> {
        *self.command.read()
    }

    /// Current round as seen at `ctx`.
    pub async fn current_round(&self, ctx: &ChainContext) -> ConsensusResult<Round> {
        let bytes = self.reader.get_current_round(ctx).await?;
        if bytes.is_empty() {
            return Err(ConsensusError::MissingRound);
        }
        Ok(Round::from_bytes(&bytes)?)
    }

    /// Decides what to mine next on top of `ctx` and caches the command.
    pub async fn trigger_consensus(
        &self,
        ctx: &ChainContext,
        now: Timestamp,
    ) -> ConsensusResult<ConsensusCommand> {
        let round = self.current_round(ctx).await?;
        let start = self.reader.get_blockchain_start_time(ctx).await?;
        let flavor = self.flavor.with_blockchain_start(start);

        let behaviour = decide(&round, &self.pubkey, now, self.params.maximum_tiny_blocks, &flavor);
        let command = build_command(&round, &self.pubkey, now, behaviour, self.params);
        *self.command.write() = Some(command);

        info!(
            height = ctx.block_height,
            round = round.round_number,
            term = round.term_number,
            hint = %command.hint,
            left_ms = command.next_block_mining_left_ms(now),
            "Updated consensus command"
        );
        Ok(command)
    }

    /// Trigger information for producing a block under `command`.
    pub fn get_trigger_information(
        &self,
        command: &ConsensusCommand,
    ) -> ConsensusResult<TriggerInformation> {
        self.trigger.get_trigger_information(command)
    }

    /// Header extra data for a block mined at `next_mining_time` on top of
    /// `ctx`, using the cached command.
    pub async fn get_information_to_update_consensus(
        &self,
        ctx: &ChainContext,
        next_mining_time: Timestamp,
    ) -> ConsensusResult<Vec<u8>> {
        let command = self.current_command().unwrap_or(ConsensusCommand::INVALID);
        let trigger = self.get_trigger_information(&command)?;
        debug!(
            height = ctx.block_height,
            behaviour = %trigger.behaviour,
            "Requesting consensus extra data"
        );
        Ok(self
            .reader
            .get_consensus_extra_data(ctx, &trigger.to_bytes(), next_mining_time)
            .await?)
    }

    /// Consensus payload stored in `header`, if any.
    pub fn extract_consensus_extra_data(header: &BlockHeader) -> Option<&[u8]> {
        header
            .extra_data(CONSENSUS_EXTRA_DATA_KEY)
            .filter(|data| !data.is_empty())
    }

    /// Checks a block's consensus payload against the state before it runs.
    ///
    /// Genesis and blocks without a payload pass.
    pub async fn validate_before_execute(&self, block: &Block) -> ConsensusResult<bool> {
        let Some(extra) = Self::precheck(block) else {
            return Ok(true);
        };
        let parent = ChainContext {
            block_hash: block.header.previous_block_hash,
            block_height: block.height().saturating_sub(1),
        };
        let result = self
            .reader
            .validate_consensus_before_execution(&parent, extra)
            .await?;
        if !result.success {
            warn!(height = block.height(), reason = %result.message, "Consensus validation before execution failed");
        }
        Ok(result.success)
    }

    /// Checks a block's consensus payload against the state after it ran.
    ///
    /// Genesis and blocks without a payload pass.
    pub async fn validate_after_execute(&self, block: &Block) -> ConsensusResult<bool> {
        let Some(extra) = Self::precheck(block) else {
            return Ok(true);
        };
        let ctx = ChainContext {
            block_hash: block.hash(),
            block_height: block.height(),
        };
        let result = self
            .reader
            .validate_consensus_after_execution(&ctx, extra)
            .await?;
        if !result.success {
            warn!(height = block.height(), reason = %result.message, "Consensus validation after execution failed");
        }
        Ok(result.success)
    }

    fn precheck(block: &Block) -> Option<&[u8]> {
        if block.is_genesis() {
            return None;
        }
        Self::extract_consensus_extra_data(&block.header)
    }
}
