//! # dposcore
//!
//! Tools around the DPoS scheduling core.
//!
//! ## Components
//!
//! - [`SimulatedNetwork`] - every miner of a chain in one process, on a
//!   simulated clock, with irreversible block discovery running on its queue
//! - [`BlockBuilder`] - assembles blocks carrying the consensus payload
//!
//! ## Example
//!
//! ```rust,no_run
//! use dposcore::{simulated_miner_keys, SimulatedNetwork};
//! use dposcore_config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.consensus.initial_miners = simulated_miner_keys(5);
//!
//!     let mut network = SimulatedNetwork::new(&config)?;
//!     for block in network.run(100).await? {
//!         println!("#{} {} by {}", block.height, block.behaviour, block.miner);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block_builder;
pub mod node;

pub use block_builder::{BlockBuilder, BlockBuilderConfig, BlockTemplate, BuiltBlock};
pub use node::{miner_seed, simulated_miner_keys, ProducedBlock, SimulatedNetwork};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "dposcore.toml";
