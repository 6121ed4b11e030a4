//! Main configuration module for dposcore
//!
//! All scheduler settings are defined in one `dposcore.toml` file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct containing all dposcore settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chain identity configuration
    pub chain: ChainConfig,

    /// Consensus scheduling parameters
    pub consensus: ConsensusConfig,

    /// Irreversible block discovery settings
    #[serde(default)]
    pub irreversible: IrreversibleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration, or an error if loading fails.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use dposcore_config::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load(Path::new("dposcore.toml"))?;
    /// ```
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            "Configuration loaded: chain_id={}, flavor={:?}, miners={}",
            config.chain.chain_id,
            config.chain.flavor,
            config.consensus.initial_miners.len()
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when configuration is provided as a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that all values are within acceptable ranges and that
    /// the configuration is internally consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        self.chain.validate()?;
        self.consensus.validate()?;
        self.irreversible.validate()?;
        self.logging.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// =============================================================================
// Chain Configuration
// =============================================================================

/// Which termination rules the chain follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Main chain: rounds roll into new terms once a quorum crosses the
    /// term boundary.
    #[default]
    Main,
    /// Side chain: terms never change.
    Side,
}

/// Chain identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Unique chain identifier
    pub chain_id: u64,

    /// Human-readable chain name
    #[serde(default = "default_chain_name")]
    pub chain_name: String,

    /// Main or side chain
    #[serde(default)]
    pub flavor: ChainKind,
}

fn default_chain_name() -> String {
    "dposcore local".to_string()
}

impl ChainConfig {
    /// Validate the chain section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain_id == 0 {
            return Err(ConfigError::InvalidChainId);
        }
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            chain_name: default_chain_name(),
            flavor: ChainKind::Main,
        }
    }
}

// =============================================================================
// Consensus Configuration
// =============================================================================

/// Round scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Length of one miner's time slot in milliseconds
    pub mining_interval_ms: u64,

    /// Tiny blocks a miner may produce per slot
    #[serde(default = "default_maximum_tiny_blocks")]
    pub maximum_tiny_blocks: u32,

    /// Term length in seconds (main chain only)
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,

    /// Minimum spacing between consecutive tiny blocks in milliseconds
    #[serde(default = "default_tiny_block_minimum_interval_ms")]
    pub tiny_block_minimum_interval_ms: u64,

    /// Hex public keys of the first term's miners
    #[serde(default)]
    pub initial_miners: Vec<String>,

    /// Time the chain started, in milliseconds since the Unix epoch
    #[serde(default)]
    pub blockchain_start_ms: u64,
}

fn default_maximum_tiny_blocks() -> u32 {
    8
}

fn default_period_seconds() -> u64 {
    604_800
}

fn default_tiny_block_minimum_interval_ms() -> u64 {
    50
}

/// Smallest mining interval the scheduler accepts.
pub const MINIMUM_MINING_INTERVAL_MS: u64 = 800;

/// Number of tiny slots one mining interval is split into.
pub const TINY_SLOTS_PER_INTERVAL: u64 = 8;

impl ConsensusConfig {
    /// Validate the consensus section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mining_interval_ms < MINIMUM_MINING_INTERVAL_MS
            || self.mining_interval_ms % TINY_SLOTS_PER_INTERVAL != 0
        {
            return Err(ConfigError::InvalidMiningInterval(self.mining_interval_ms));
        }

        if self.maximum_tiny_blocks == 0 {
            return Err(ConfigError::InvalidTinyBlocks(self.maximum_tiny_blocks));
        }

        if self.period_seconds == 0 {
            return Err(ConfigError::InvalidPeriod);
        }

        let tiny_slot = self.tiny_slot_ms();
        if self.tiny_block_minimum_interval_ms == 0 || self.tiny_block_minimum_interval_ms >= tiny_slot
        {
            return Err(ConfigError::InvalidTinyBlockInterval {
                value: self.tiny_block_minimum_interval_ms,
                tiny_slot,
            });
        }

        if self.initial_miners.is_empty() {
            return Err(ConfigError::NoMiners);
        }

        let mut seen = HashSet::new();
        for miner in &self.initial_miners {
            let raw = miner.strip_prefix("0x").unwrap_or(miner);
            if raw.is_empty() || hex::decode(raw).is_err() {
                return Err(ConfigError::InvalidPubkey(miner.clone()));
            }
            if !seen.insert(raw.to_lowercase()) {
                return Err(ConfigError::DuplicateMiner(miner.clone()));
            }
        }

        Ok(())
    }

    /// Length of one tiny slot in milliseconds.
    pub fn tiny_slot_ms(&self) -> u64 {
        self.mining_interval_ms / TINY_SLOTS_PER_INTERVAL
    }

    /// Initial miners as lowercase hex without prefix.
    pub fn normalized_miners(&self) -> Vec<String> {
        self.initial_miners
            .iter()
            .map(|m| m.strip_prefix("0x").unwrap_or(m).to_lowercase())
            .collect()
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            mining_interval_ms: 4000,
            maximum_tiny_blocks: default_maximum_tiny_blocks(),
            period_seconds: default_period_seconds(),
            tiny_block_minimum_interval_ms: default_tiny_block_minimum_interval_ms(),
            initial_miners: Vec::new(),
            blockchain_start_ms: 0,
        }
    }
}

// =============================================================================
// Irreversible Block Discovery Configuration
// =============================================================================

/// Order in which discovered irreversible-height candidates are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrder {
    /// Use the first candidate found while scanning the batch.
    #[default]
    AsDiscovered,
    /// Use the highest candidate in the batch.
    HighestFirst,
}

/// Irreversible block discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrreversibleConfig {
    /// System contract name that emits the finality marker
    pub consensus_contract_name: String,

    /// Candidate selection order
    #[serde(default)]
    pub candidate_order: CandidateOrder,

    /// Name of the serialized queue discovery jobs run on
    pub queue_name: String,
}

impl IrreversibleConfig {
    /// Validate the irreversible section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consensus_contract_name.trim().is_empty() {
            return Err(ConfigError::MissingField("irreversible.consensus_contract_name"));
        }
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::MissingField("irreversible.queue_name"));
        }
        Ok(())
    }
}

impl Default for IrreversibleConfig {
    fn default() -> Self {
        Self {
            consensus_contract_name: "Consensus".to_string(),
            candidate_order: CandidateOrder::AsDiscovered,
            queue_name: "IrreversibleBlockQueue".to_string(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json, compact)
    pub format: String,

    /// Log file path (optional)
    #[serde(default)]
    pub file: Option<String>,
}

impl LoggingConfig {
    /// Validate the logging section.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "json", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}
