//! In-memory consensus contract.
//!
//! Holds the current and previous round, turns trigger information into
//! header payloads, validates them and, once a block is applied, emits the
//! finality marker whenever the miners' implied heights confirm a higher
//! irreversible block. Used by tests and the `simulate` command.

use crate::behaviour::Behaviour;
use crate::round::{MinerInRound, Round};
use crate::transition::{
    apply_tiny_block, apply_update_value, calculate_last_irreversible_height, generate_next_round,
    generate_next_term, UpdateValueInput,
};
use crate::wire::{HeaderInformation, IrreversibleBlockFound, TriggerInformation, IRREVERSIBLE_BLOCK_FOUND_EVENT};
use async_trait::async_trait;
use dposcore_core::{ChainContext, ChainError, ChainResult, ConsensusContractReader, ValidationResult};
use dposcore_types::{Address, Hash, LogEvent, Timestamp};
use parking_lot::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct ContractState {
    current: Round,
    previous: Option<Round>,
    blockchain_start: Timestamp,
    elected_miners: Option<Vec<String>>,
}

/// Consensus contract state machine held in memory.
#[derive(Debug)]
pub struct InMemoryConsensusContract {
    address: Address,
    state: RwLock<ContractState>,
}

fn decode_error(err: rlp::DecoderError) -> ChainError {
    ChainError::Internal(format!("malformed consensus payload: {err}"))
}

/// Signature for a revealed secret: the secret hashed together with every
/// signature published in the previous round.
pub fn calculate_signature(previous: Option<&Round>, revealed: Hash) -> Hash {
    let mut parts: Vec<&[u8]> = vec![revealed.as_bytes()];
    if let Some(round) = previous {
        parts.extend(
            round
                .miners
                .values()
                .filter_map(|m| m.signature.as_ref())
                .map(|sig| sig.as_bytes()),
        );
    }
    Hash::sha256_concat(&parts)
}

impl InMemoryConsensusContract {
    /// Creates the contract at `address` starting from `first_round`.
    pub fn new(address: Address, first_round: Round, blockchain_start: Timestamp) -> Self {
        Self {
            address,
            state: RwLock::new(ContractState {
                current: first_round,
                previous: None,
                blockchain_start,
                elected_miners: None,
            }),
        }
    }

    /// Contract address that emits the finality marker.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Snapshot of the current round.
    pub fn current_round(&self) -> Round {
        self.state.read().current.clone()
    }

    /// Miner list used by the next term. Defaults to the current miners.
    pub fn set_elected_miners(&self, miners: Vec<String>) {
        self.state.write().elected_miners = Some(miners);
    }

    /// Applies the consensus payload of a block at `height`.
    ///
    /// Returns the logs the block emits.
    pub fn process_consensus_information(
        &self,
        info: &HeaderInformation,
        height: u64,
    ) -> Vec<LogEvent> {
        let mut state = self.state.write();
        let mut logs = Vec::new();

        match info.behaviour {
            Behaviour::UpdateValue | Behaviour::UpdateValueWithoutPreviousInValue => {
                let mut round = info.round.clone();
                let lib = state
                    .previous
                    .as_ref()
                    .and_then(|previous| calculate_last_irreversible_height(previous, &round));
                if let Some(lib) = lib {
                    if lib > round.confirmed_irreversible_block_height && lib <= height {
                        info!(lib, height, round = round.round_number, "Miners confirmed irreversible height");
                        round.confirmed_irreversible_block_height = lib;
                        round.confirmed_irreversible_block_round_number = round.round_number;
                        logs.push(LogEvent::new(
                            self.address,
                            IRREVERSIBLE_BLOCK_FOUND_EVENT,
                            IrreversibleBlockFound {
                                offset: height - lib,
                            }
                            .to_bytes(),
                        ));
                    }
                }
                state.current = round;
            }
            Behaviour::TinyBlock => state.current = info.round.clone(),
            Behaviour::NextRound | Behaviour::NextTerm => {
                let next = info.round.clone();
                let finished = std::mem::replace(&mut state.current, next);
                state.previous = Some(finished);
                if info.behaviour == Behaviour::NextTerm {
                    state.elected_miners = None;
                }
            }
            Behaviour::Nothing => {}
        }

        debug!(
            height,
            sender = %info.sender_pubkey,
            behaviour = %info.behaviour,
            logs = logs.len(),
            "Processed consensus information"
        );
        logs
    }
}

#[async_trait]
impl ConsensusContractReader for InMemoryConsensusContract {
    async fn get_current_round(&self, _ctx: &ChainContext) -> ChainResult<Vec<u8>> {
        Ok(self.state.read().current.to_bytes())
    }

    async fn get_blockchain_start_time(&self, _ctx: &ChainContext) -> ChainResult<Timestamp> {
        Ok(self.state.read().blockchain_start)
    }

    async fn get_consensus_extra_data(
        &self,
        ctx: &ChainContext,
        trigger_information: &[u8],
        block_time: Timestamp,
    ) -> ChainResult<Vec<u8>> {
        let trigger = TriggerInformation::from_bytes(trigger_information).map_err(decode_error)?;
        let state = self.state.read();
        let current = &state.current;
        let pubkey = trigger.pubkey.as_str();

        if !current.is_miner(pubkey) {
            return Err(ChainError::Internal(format!("{pubkey} is not a miner of round {}", current.round_number)));
        }

        let round = match trigger.behaviour {
            Behaviour::UpdateValue | Behaviour::UpdateValueWithoutPreviousInValue => {
                let in_value = trigger
                    .in_value
                    .ok_or_else(|| ChainError::Internal("trigger information lacks in value".into()))?;
                let revealed = trigger.previous_in_value.unwrap_or(in_value);
                let input = UpdateValueInput {
                    out_value: Hash::sha256(in_value.as_bytes()),
                    signature: calculate_signature(state.previous.as_ref(), revealed),
                    previous_in_value: trigger.previous_in_value,
                    implied_irreversible_block_height: ctx.block_height + 1,
                };
                apply_update_value(current, pubkey, input, block_time)
            }
            Behaviour::TinyBlock => apply_tiny_block(current, pubkey, block_time),
            Behaviour::NextRound => generate_next_round(current, block_time, pubkey),
            Behaviour::NextTerm => {
                let miners = state
                    .elected_miners
                    .clone()
                    .unwrap_or_else(|| current.miners.keys().cloned().collect());
                generate_next_term(current, &miners, block_time, pubkey)
            }
            Behaviour::Nothing => {
                return Err(ChainError::Internal("no consensus behaviour to carry out".into()));
            }
        };

        Ok(HeaderInformation {
            sender_pubkey: trigger.pubkey,
            behaviour: trigger.behaviour,
            round,
        }
        .to_bytes())
    }

    async fn validate_consensus_before_execution(
        &self,
        _ctx: &ChainContext,
        extra_data: &[u8],
    ) -> ChainResult<ValidationResult> {
        let info = HeaderInformation::from_bytes(extra_data).map_err(decode_error)?;
        let state = self.state.read();
        let current = &state.current;

        if !current.is_miner(&info.sender_pubkey) {
            return Ok(ValidationResult::rejected(format!(
                "sender {} is not a miner of round {}",
                info.sender_pubkey, current.round_number
            )));
        }

        if info.behaviour == Behaviour::Nothing {
            return Ok(ValidationResult::rejected("block carries no consensus behaviour"));
        }
        let expected_round = if info.behaviour.terminates_round() {
            current.round_number + 1
        } else {
            current.round_number
        };
        if info.round.round_number != expected_round {
            return Ok(ValidationResult::rejected(format!(
                "round number {} does not follow {}",
                info.round.round_number, current.round_number
            )));
        }
        if info.behaviour == Behaviour::NextTerm && info.round.term_number != current.term_number + 1 {
            return Ok(ValidationResult::rejected("term number did not advance"));
        }
        if info.behaviour.is_update_value()
            && !info
                .round
                .miner(&info.sender_pubkey)
                .is_some_and(MinerInRound::is_mined_block_for_current_round)
        {
            return Ok(ValidationResult::rejected("update value without a published commitment"));
        }
        if info.behaviour == Behaviour::NextRound && info.round.term_number != current.term_number {
            return Ok(ValidationResult::rejected("term number changed without a new term"));
        }
        if let Err(err) = info.round.validate() {
            return Ok(ValidationResult::rejected(err.to_string()));
        }
        Ok(ValidationResult::ok())
    }

    async fn validate_consensus_after_execution(
        &self,
        _ctx: &ChainContext,
        extra_data: &[u8],
    ) -> ChainResult<ValidationResult> {
        let info = HeaderInformation::from_bytes(extra_data).map_err(decode_error)?;
        let state = self.state.read();
        let current = &state.current;

        let mut expected = info.round.clone();
        expected.confirmed_irreversible_block_height = current.confirmed_irreversible_block_height;
        expected.confirmed_irreversible_block_round_number = current.confirmed_irreversible_block_round_number;
        if &expected != current {
            return Ok(ValidationResult::rejected(format!(
                "round {} in header differs from contract state",
                info.round.round_number
            )));
        }
        Ok(ValidationResult::ok())
    }
}
