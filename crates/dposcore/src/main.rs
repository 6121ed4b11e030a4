//! # dposcore
//!
//! Command-line entry point.
//!
//! - `init` writes a configuration for a set of simulated miners
//! - `schedule` decides and builds a consensus command for a round snapshot
//! - `simulate` runs all miners in-process and reports the produced blocks

use anyhow::{Context, Result};
use clap::Parser;
use dposcore::{simulated_miner_keys, SimulatedNetwork, DEFAULT_CONFIG_FILE};
use dposcore_config::{ChainKind, Config};
use dposcore_consensus::{build_command, decide, ChainFlavor, CommandParameters, Round};
use dposcore_types::Timestamp;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// DPoS scheduling tools
#[derive(Parser, Debug)]
#[command(name = "dposcore")]
#[command(version)]
#[command(about = "DPoS round scheduling, consensus commands and irreversible block discovery")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format: text, json, or compact
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Flavor {
    Main,
    Side,
}

impl From<Flavor> for ChainKind {
    fn from(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Main => ChainKind::Main,
            Flavor::Side => ChainKind::Side,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Write a configuration file for simulated miners
    Init {
        /// Output configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: String,

        /// Chain ID
        #[arg(long, default_value = "1")]
        chain_id: u64,

        /// Number of miners
        #[arg(long, default_value = "5")]
        miners: usize,

        /// Chain flavor
        #[arg(long, value_enum, default_value = "main")]
        flavor: Flavor,

        /// Mining interval in milliseconds
        #[arg(long, default_value = "4000")]
        mining_interval_ms: u64,
    },

    /// Decide what a miner should do for a round snapshot
    Schedule {
        /// Configuration file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,

        /// Round snapshot (JSON)
        #[arg(short, long)]
        round: String,

        /// Miner public key (hex)
        #[arg(short, long)]
        pubkey: String,

        /// Current time in milliseconds (defaults to the system clock)
        #[arg(long)]
        now: Option<u64>,
    },

    /// Run every miner in-process on a simulated clock
    Simulate {
        /// Configuration file path (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Number of miners (overrides the configured miner list)
        #[arg(long)]
        miners: Option<usize>,

        /// Number of blocks to produce
        #[arg(short, long, default_value = "100")]
        blocks: usize,

        /// Print produced blocks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli)?;

    match cli.command {
        Commands::Init {
            output,
            chain_id,
            miners,
            flavor,
            mining_interval_ms,
        } => handle_init(output, chain_id, miners, flavor, mining_interval_ms),
        Commands::Schedule {
            config,
            round,
            pubkey,
            now,
        } => handle_schedule(config, round, pubkey, now),
        Commands::Simulate {
            config,
            miners,
            blocks,
            json,
        } => handle_simulate(config, miners, blocks, json).await,
        Commands::Version => handle_version(),
    }
}

/// Initialize tracing with the configured format and verbosity
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = match cli.verbose {
        0 => "info,dposcore=info",
        1 => "info,dposcore=debug,dposcore_consensus=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
        }
    }

    Ok(())
}

/// Handle the `init` command - write a configuration for simulated miners
fn handle_init(
    output: String,
    chain_id: u64,
    miners: usize,
    flavor: Flavor,
    mining_interval_ms: u64,
) -> Result<()> {
    let mut config = Config::default();
    config.chain.chain_id = chain_id;
    config.chain.flavor = flavor.into();
    config.consensus.mining_interval_ms = mining_interval_ms;
    config.consensus.initial_miners = simulated_miner_keys(miners);
    config.consensus.blockchain_start_ms = Timestamp::now().as_millis();
    config.validate()?;

    let path = Path::new(&output);
    config.save(path)?;
    info!(path = %path.display(), miners, "Wrote configuration");

    println!("Configuration written to {output}");
    println!("  Chain ID: {chain_id}");
    println!("  Flavor: {:?}", config.chain.flavor);
    println!("  Miners: {miners}");
    Ok(())
}

/// Handle the `schedule` command - decide and build a command for a snapshot
fn handle_schedule(config_path: String, round_path: String, pubkey: String, now: Option<u64>) -> Result<()> {
    let config = Config::load(Path::new(&config_path))?;
    let content = std::fs::read_to_string(&round_path)
        .with_context(|| format!("reading round snapshot {round_path}"))?;
    let round: Round = serde_json::from_str(&content).context("parsing round snapshot")?;
    round.validate().context("invalid round snapshot")?;

    let now = now.map(Timestamp::from_millis).unwrap_or_else(Timestamp::now);
    let flavor = ChainFlavor::from_config(config.chain.flavor, &config.consensus);
    let params = CommandParameters::from(&config.consensus);

    let behaviour = decide(&round, &pubkey, now, params.maximum_tiny_blocks, &flavor);
    let command = build_command(&round, &pubkey, now, behaviour, params);

    let report = serde_json::json!({
        "round": round.round_number,
        "term": round.term_number,
        "pubkey": pubkey,
        "now": now,
        "command": command,
        "next_block_mining_left_ms": command.next_block_mining_left_ms(now),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Handle the `simulate` command - run all miners in-process
async fn handle_simulate(
    config_path: Option<String>,
    miners: Option<usize>,
    blocks: usize,
    json: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::default(),
    };
    let count = miners.unwrap_or(match config.consensus.initial_miners.len() {
        0 => 5,
        n => n,
    });
    config.consensus.initial_miners = simulated_miner_keys(count);

    let mut network = SimulatedNetwork::new(&config)?;
    let produced = network.run(blocks).await?;
    network.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&produced)?);
        return Ok(());
    }
    for block in &produced {
        println!(
            "#{:<5} {:>12} round {:<3} term {:<2} lib {:<5} {:<34} {}",
            block.height,
            block.time.to_string(),
            block.round_number,
            block.term_number,
            block.irreversible_height,
            block.behaviour.to_string(),
            &block.miner[..16.min(block.miner.len())],
        );
    }
    Ok(())
}

fn handle_version() -> Result<()> {
    println!("dposcore {}", dposcore::VERSION);
    Ok(())
}
