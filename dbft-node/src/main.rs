// dBFT Devnet Node
//
// Runs a complete delegated BFT validator set inside one process. Every node
// has its own in-memory ledger and consensus service; they talk over an
// in-process network.
//
// Usage:
//   cargo run --bin dbft-node -- --validators 4 --target-height 10
//
// Architecture:
//   1. Load configuration from file and command-line arguments
//   2. Create one ledger, wallet and consensus service per node
//   3. Connect the nodes through the local network
//   4. Seed the mempools and start consensus
//   5. Report progress until the target height or Ctrl+C
//   6. Shut every service down and report its metrics

mod devnet;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dbft_core::ConsensusConfig;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default number of validators
const DEFAULT_VALIDATORS: usize = 4;

/// Default number of transactions placed in the mempool before starting
const DEFAULT_SEED_TRANSACTIONS: u64 = 16;

/// Devnet configuration.
///
/// Loaded from a JSON file with `--config`; flags that follow it override the
/// file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Number of validators
    pub validators: usize,

    /// Number of non-validating nodes following the chain
    pub observers: usize,

    /// Validators that never send or receive anything
    pub offline: Vec<usize>,

    /// Stop once any node persists this height; run until Ctrl+C otherwise
    pub target_height: Option<u32>,

    /// Transactions placed in every mempool before consensus starts
    pub seed_transactions: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Consensus engine settings
    pub consensus: ConsensusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            validators: DEFAULT_VALIDATORS,
            observers: 0,
            offline: Vec::new(),
            target_height: None,
            seed_transactions: DEFAULT_SEED_TRANSACTIONS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            consensus: ConsensusConfig::default(),
        }
    }
}

/// What the command line asks for.
#[derive(Debug, PartialEq)]
enum Command {
    Run(NodeConfig),
    Help,
}

impl NodeConfig {
    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse command-line arguments, excluding the program name.
    fn from_args(args: &[String]) -> Result<Command> {
        let mut config = Self::default();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            if matches!(flag, "--help" | "-h") {
                return Ok(Command::Help);
            }
            let value = args
                .get(i + 1)
                .ok_or_else(|| anyhow!("Missing value for {}", flag))?;
            match flag {
                "--config" | "-c" => config = Self::from_file(&PathBuf::from(value))?,
                "--validators" => config.validators = parse(flag, value)?,
                "--observers" => config.observers = parse(flag, value)?,
                "--offline" => {
                    config.offline = value
                        .split(',')
                        .map(|v| parse(flag, v.trim()))
                        .collect::<Result<_>>()?;
                }
                "--target-height" => config.target_height = Some(parse(flag, value)?),
                "--seed-transactions" => config.seed_transactions = parse(flag, value)?,
                "--block-interval-ms" => config.consensus.block_interval_ms = parse(flag, value)?,
                "--log-level" => config.log_level = value.clone(),
                _ => bail!("Unknown flag or argument: {}", flag),
            }
            i += 2;
        }

        Ok(Command::Run(config))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.validators == 0 {
            bail!("validators must be at least 1");
        }
        if u16::try_from(self.validators).is_err() {
            bail!("validators must fit a validator index");
        }
        if let Some(i) = self.offline.iter().find(|i| **i >= self.validators) {
            bail!("offline validator {} is not in the set", i);
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => bail!("Invalid log level: {}", self.log_level),
        }
        self.consensus.validate()?;
        Ok(())
    }
}

fn parse<V: std::str::FromStr>(flag: &str, value: &str) -> Result<V> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", flag, value))
}

/// Print usage information.
fn print_usage() {
    println!("dBFT Devnet Node v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    dbft-node [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>              JSON configuration file");
    println!("        --validators <N>             Number of validators [default: {}]", DEFAULT_VALIDATORS);
    println!("        --observers <N>              Number of non-validating nodes [default: 0]");
    println!("        --offline <I,J,..>           Validators to keep silent");
    println!("        --target-height <H>          Stop after height H is persisted");
    println!("        --seed-transactions <N>      Transactions to seed the mempool with [default: {}]", DEFAULT_SEED_TRANSACTIONS);
    println!("        --block-interval-ms <MS>     Target block interval [default: 15000]");
    println!("        --log-level <LEVEL>          Log level (trace|debug|info|warn|error) [default: {}]", DEFAULT_LOG_LEVEL);
    println!("    -h, --help                       Print this help information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    RUST_LOG                         Per-module log filters, applied after --log-level");
}

/// Initialize logging.
fn init_logging(config: &NodeConfig) -> Result<()> {
    let level = match config.log_level.as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init()
        .context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match NodeConfig::from_args(&args)? {
        Command::Run(config) => config,
        Command::Help => {
            print_usage();
            return Ok(());
        }
    };
    config.validate()?;
    init_logging(&config)?;

    log::info!("dBFT Devnet Node v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {:?}", config);

    devnet::run(config).await?;

    log::info!("dBFT Devnet Node stopped");
    Ok(())
}
