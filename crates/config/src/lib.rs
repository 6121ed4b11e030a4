//! # dposcore Configuration
//!
//! This crate provides configuration parsing for the dposcore consensus
//! scheduler.
//!
//! All settings live in one `dposcore.toml` file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dposcore_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("dposcore.toml"))?;
//!
//! println!("Chain ID: {}", config.chain.chain_id);
//! println!("Mining interval: {}ms", config.consensus.mining_interval_ms);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[chain]` - Chain identity and flavor (main or side chain)
//! - `[consensus]` - Round timing, tiny block budget, term length, initial miners
//! - `[irreversible]` - Irreversible block discovery settings
//! - `[logging]` - Logging settings (level, format)

#![warn(missing_docs)]

mod config;
mod error;

pub use config::*;
pub use error::*;
