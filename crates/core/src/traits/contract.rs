//! Contract-facing traits: address resolution and read-only consensus calls.

use super::{ChainContext, ChainResult};
use async_trait::async_trait;
use dposcore_types::{Address, Timestamp};

/// Maps well-known system contract names to their runtime addresses.
pub trait ContractAddressResolver: Send + Sync {
    /// Address of the named contract, if deployed.
    fn resolve(&self, name: &str) -> Option<Address>;
}

/// Outcome of a consensus validation call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    /// Whether the header information was accepted.
    pub success: bool,
    /// Reason for rejection (empty on success).
    pub message: String,
}

impl ValidationResult {
    /// An accepting result.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    /// A rejecting result.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Read-only view calls against the on-chain consensus contract.
///
/// Payloads are opaque bytes at this layer; the consensus crate owns their
/// encoding.
#[async_trait]
pub trait ConsensusContractReader: Send + Sync + 'static {
    /// Encoded current round as of `ctx`.
    async fn get_current_round(&self, ctx: &ChainContext) -> ChainResult<Vec<u8>>;

    /// Time the chain started producing blocks.
    async fn get_blockchain_start_time(&self, ctx: &ChainContext) -> ChainResult<Timestamp>;

    /// Header extra data for the block about to be produced at `block_time`
    /// on top of `ctx`, given encoded trigger information.
    async fn get_consensus_extra_data(
        &self,
        ctx: &ChainContext,
        trigger_information: &[u8],
        block_time: Timestamp,
    ) -> ChainResult<Vec<u8>>;

    /// Validate header extra data before the block is executed.
    async fn validate_consensus_before_execution(
        &self,
        ctx: &ChainContext,
        extra_data: &[u8],
    ) -> ChainResult<ValidationResult>;

    /// Validate header extra data against the post-execution state.
    async fn validate_consensus_after_execution(
        &self,
        ctx: &ChainContext,
        extra_data: &[u8],
    ) -> ChainResult<ValidationResult>;
}
