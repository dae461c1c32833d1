//! CLI surface for ordered-kv.
//!
//! `run` hosts one replica. `put` and `status` talk to a running replica,
//! `coordinator` collects lifecycle reports, and `config` prints or writes
//! the effective config.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{self, Config, ConfigLayer, DEFAULT_CONFIG_FILE, LimitsOverride};
use crate::core::{Mode, ReplicaId};
use crate::telemetry::{self, TelemetryConfig, TelemetryGuard};
use crate::Result;

mod commands;
mod render;

#[derive(Parser, Debug)]
#[command(
    name = "ordered-kv",
    version,
    about = "Replicated key-value store with causal or total-order broadcast",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one replica until SIGINT or SIGTERM.
    Run(NodeArgs),

    /// Submit a write to a replica.
    Put(PutArgs),

    /// Show a replica's clock, buffer and scheduler counters.
    Status(StatusArgs),

    /// Collect replica lifecycle reports.
    Coordinator(CoordinatorArgs),

    /// Print the effective config, or write it to a file.
    Config(ConfigArgs),
}

/// Replica settings; flags win over the config file and environment.
#[derive(Args, Debug, Default, Clone)]
pub struct NodeArgs {
    /// Config file (default: ./ordered-kv.toml when present).
    #[arg(long, short = 'c', value_name = "PATH", env = "KV_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "ID")]
    pub replica_id: Option<u32>,

    /// `causal` or `sequential` (alias `total`).
    #[arg(long, value_name = "MODE")]
    pub mode: Option<Mode>,

    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Every replica address in id order, self included. Repeatable.
    #[arg(long = "peer", value_name = "ADDR")]
    pub peers: Vec<String>,

    #[arg(long, value_name = "ADDR")]
    pub coordinator: Option<String>,

    #[arg(long, value_name = "N")]
    pub buffer_capacity: Option<usize>,

    #[arg(long, value_name = "N")]
    pub fanout_parallelism: Option<usize>,
}

impl NodeArgs {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            replica_id: self.replica_id.map(ReplicaId::new),
            mode: self.mode,
            listen_addr: self.listen.clone(),
            peers: (!self.peers.is_empty()).then(|| self.peers.clone()),
            coordinator_addr: self.coordinator.clone(),
            limits: LimitsOverride {
                buffer_capacity: self.buffer_capacity,
                fanout_parallelism: self.fanout_parallelism,
                ..LimitsOverride::default()
            },
            ..ConfigLayer::default()
        }
    }

    /// Defaults, config file, environment, then flags.
    pub fn resolve(&self) -> Result<Config> {
        let mut cfg = config::load(&self.config_path())?;
        self.layer().apply_to(&mut cfg);
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Replica to submit to.
    #[arg(long, short = 'a', value_name = "ADDR")]
    pub addr: String,

    pub key: String,

    pub value: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, short = 'a', value_name = "ADDR")]
    pub addr: String,

    /// Machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CoordinatorArgs {
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:7000")]
    pub listen: String,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Write the effective config here instead of printing it.
    #[arg(long, value_name = "PATH")]
    pub write: Option<PathBuf>,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

/// Run the CLI (used by bin).
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => commands::run::handle(cli.verbose, args),
        Commands::Put(args) => {
            let _guard = init_client_tracing(cli.verbose);
            commands::put::handle(args)
        }
        Commands::Status(args) => {
            let _guard = init_client_tracing(cli.verbose);
            commands::status::handle(args)
        }
        Commands::Coordinator(args) => {
            let _guard = init_client_tracing(cli.verbose.max(1));
            commands::coordinator::handle(args)
        }
        Commands::Config(args) => {
            let _guard = init_client_tracing(cli.verbose);
            commands::config::handle(args)
        }
    }
}

/// Stderr-only logging for short-lived commands.
fn init_client_tracing(verbosity: u8) -> TelemetryGuard {
    let mut logging = config::LoggingConfig::default();
    logging.file.enabled = false;
    telemetry::init(TelemetryConfig::new(verbosity, logging))
}
