//! # dposcore Consensus
//!
//! Round-robin DPoS scheduling and irreversible block discovery.
//!
//! Miners take turns in fixed time slots. Each round is one rotation of the
//! miner set, followed by an extra slot in which a designated miner closes
//! the round. Rounds group into terms; a term ends once enough miners have
//! produced past the term boundary (main chain only).
//!
//! ## Scheduling Flow
//!
//! ```text
//! ┌──────────────┐   round snapshot   ┌──────────────┐
//! │  consensus   │ ─────────────────► │    decide    │  pure
//! │  contract    │                    └──────┬───────┘
//! └──────▲───────┘                           │ Behaviour
//!        │ extra data                 ┌──────▼───────┐
//!        │                            │ build_command│  pure
//! ┌──────┴───────┐   trigger info     └──────┬───────┘
//! │  block       │ ◄───────────────── ConsensusCommand
//! │  production  │
//! └──────────────┘
//! ```
//!
//! ## Finality Flow
//!
//! ```text
//! best chain found ──► BestChainFoundHandler ──► IrreversibleBlockQueue
//!                                                   │ (one job at a time)
//!                                                   ▼
//!                         discover (bloom filter, marker logs) ──► commit
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use dposcore_consensus::{build_command, decide, ChainFlavor, CommandParameters};
//!
//! let behaviour = decide(&round, &pubkey, now, 8, &ChainFlavor::Side);
//! let command = build_command(&round, &pubkey, now, behaviour, CommandParameters::default());
//! println!("mine in {} ms", command.next_block_mining_left_ms(now));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod behaviour;
pub mod command;
pub mod error;
pub mod handler;
pub mod irreversible;
pub mod memory;
pub mod queue;
pub mod round;
pub mod service;
pub mod transition;
pub mod trigger;
pub mod wire;

pub use behaviour::{decide, need_to_change_term, Behaviour, ChainFlavor};
pub use command::{
    build_command, strategy_for, CommandParameters, CommandStrategy, ConsensusCommand,
    FirstRoundStrategy, MiningTimeLimits, NormalBlockStrategy, TerminateRoundStrategy,
    TinyBlockStrategy,
};
pub use error::{ConsensusError, ConsensusResult};
pub use handler::{BestChainFoundEvent, BestChainFoundHandler};
pub use irreversible::{IrreversibleBlockDiscoveryService, IrreversibleBlockIndex};
pub use memory::InMemoryConsensusContract;
pub use queue::{TaskQueue, TaskQueueManager};
pub use round::{MinerInRound, Round, RoundError};
pub use service::ConsensusService;
pub use transition::{
    apply_tiny_block, apply_update_value, calculate_last_irreversible_height, generate_first_round,
    generate_next_round, generate_next_term, UpdateValueInput,
};
pub use trigger::TriggerInformationProvider;
pub use wire::{
    ConsensusHint, HeaderInformation, IrreversibleBlockFound, TriggerInformation,
    CONSENSUS_EXTRA_DATA_KEY, IRREVERSIBLE_BLOCK_FOUND_EVENT,
};
