//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        /// Path that was written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid chain ID (must be non-zero)
    #[error("Invalid chain ID: chain_id must be non-zero")]
    InvalidChainId,

    /// Invalid mining interval
    #[error("Invalid mining interval: must be at least 800ms and a multiple of 8, got {0}ms")]
    InvalidMiningInterval(u64),

    /// Invalid tiny block budget
    #[error("Invalid maximum_tiny_blocks: must be at least 1, got {0}")]
    InvalidTinyBlocks(u32),

    /// Invalid term period
    #[error("Invalid period_seconds: must be positive")]
    InvalidPeriod,

    /// Invalid tiny block spacing
    #[error("Invalid tiny_block_minimum_interval_ms: must be positive and below the tiny slot ({tiny_slot}ms), got {value}ms")]
    InvalidTinyBlockInterval {
        /// Configured spacing
        value: u64,
        /// Length of one tiny slot
        tiny_slot: u64,
    },

    /// No initial miners configured
    #[error("No initial miners configured: at least one miner required")]
    NoMiners,

    /// Invalid public key format
    #[error("Invalid public key format: {0}")]
    InvalidPubkey(String),

    /// Duplicate initial miner
    #[error("Duplicate initial miner: {0}")]
    DuplicateMiner(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, json, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
