//! flowr - rule-validated flow graphs
//!
//! Builds flows whose shape is checked against a rule hierarchy and runs
//! execution states through them.

mod commands;
mod config;
mod sample;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, StoreBackend};
use flowr_core::{FlowEngine, FlowId, RuleSetId, StateId};
use flowr_storage::{FileStore, MemoryStore, RecordStore, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowr")]
#[command(about = "Build rule-validated flows and run states through them")]
#[command(version)]
struct Cli {
    /// Data directory (overrides configuration)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the sample rule set and its two flows
    Seed,

    /// Seed an in-process engine and run both sample flows
    Demo,

    /// List rule sets
    RuleSets,

    /// List flows
    Flows,

    /// List states
    States,

    /// Print the topology of a rule set as JSON
    ExportRules {
        /// Rule set ID
        id: RuleSetId,
    },

    /// Print the topology of a flow as JSON
    ExportFlow {
        /// Flow ID
        id: FlowId,
    },

    /// Create a state over a flow and advance it
    Run {
        /// Flow ID
        flow: FlowId,

        /// Rule to take at a multi-path step, by label or name (repeatable)
        #[arg(short, long = "choice")]
        choices: Vec<String>,

        /// Maximum number of steps after start
        #[arg(long, default_value = "20")]
        max_steps: usize,
    },

    /// Render the edit screen of a flow node
    EditScreen {
        /// Flow ID
        flow: FlowId,

        /// Node index within the flow
        node: u64,

        /// Context JSON
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Delete a flow that no state runs over
    DeleteFlow {
        /// Flow ID
        id: FlowId,
    },

    /// Delete a state
    DeleteState {
        /// State ID
        id: StateId,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration (from file if FLOWR_CONFIG is set, then env overrides)
    let loaded = Config::load();

    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    let store: Arc<dyn RecordStore> = match (&cli.command, config.storage.backend) {
        (Commands::Demo, _) | (_, StoreBackend::Memory) => {
            tracing::debug!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        (_, StoreBackend::File) => {
            let store_config = StoreConfig::new(&config.storage.data_dir)
                .with_fsync_policy(config.storage.fsync);
            let store = FileStore::open(store_config)?;
            tracing::debug!("Using file store at {}", store.dir().display());
            Arc::new(store)
        }
    };

    let engine = FlowEngine::open(sample::registry()?, store)?;

    match commands::execute(&engine, cli.command) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
