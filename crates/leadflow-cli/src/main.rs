use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use leadflow_ai::ExtractorSettings;
use leadflow_storage::{BackendKind, FailurePolicy, RecordStore, StoreOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod lead;
mod report;

#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about = "Commodity lead book: leads, rates and phonebook")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct StoreArgs {
    /// SQLite database path.
    #[arg(long, global = true, env = "LEADFLOW_DB", default_value = "leadflow.db")]
    db: String,

    #[arg(long, global = true, env = "LEADFLOW_BACKEND", default_value = "sqlite")]
    backend: BackendKind,

    /// `surface` reports storage outages, `fallback-to-memory` keeps working in memory.
    #[arg(long, global = true, env = "LEADFLOW_FAILURE_POLICY", default_value = "surface")]
    failure_policy: FailurePolicy,
}

impl StoreArgs {
    fn options(&self) -> StoreOptions {
        StoreOptions {
            backend: self.backend,
            path: self.db.clone().into(),
            policy: self.failure_policy,
        }
    }

    fn open(&self) -> Result<RecordStore> {
        RecordStore::open(&self.options())
            .with_context(|| format!("failed to open record store at {}", self.db))
    }
}

#[derive(Args, Debug, Clone)]
struct AiArgs {
    #[arg(long, env = "LEADFLOW_AI_ENDPOINT", default_value = leadflow_ai::DEFAULT_ENDPOINT)]
    ai_endpoint: String,

    #[arg(long, env = "LEADFLOW_AI_MODEL", default_value = leadflow_ai::DEFAULT_MODEL)]
    ai_model: String,

    #[arg(long, env = "LEADFLOW_AI_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,

    #[arg(long, env = "LEADFLOW_AI_TIMEOUT_SECS", default_value_t = 60)]
    ai_timeout_secs: u64,
}

impl AiArgs {
    fn settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            endpoint: self.ai_endpoint.clone(),
            model: self.ai_model.clone(),
            api_key: self
                .ai_api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            timeout: Duration::from_secs(self.ai_timeout_secs.max(1)),
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Create, list, edit and parse leads.
    Lead {
        #[command(subcommand)]
        command: lead::LeadCommand,
    },
    /// Headline counts, buyer/seller split and status funnel.
    Stats(report::StatsArgs),
    /// List or add rate sheet rows.
    Rates {
        #[command(subcommand)]
        command: report::RatesCommand,
    },
    /// List phonebook contacts.
    Phonebook(report::PhonebookArgs),
    /// Write CSV exports.
    Export(report::ExportArgs),
    /// Show the storage backend and fallback state.
    Storage(report::StorageArgs),
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut store = cli.store.open()?;
    match cli.command {
        Commands::Lead { command } => lead::handle_lead_command(&mut store, command),
        Commands::Stats(args) => report::handle_stats(&mut store, args),
        Commands::Rates { command } => report::handle_rates_command(&mut store, command),
        Commands::Phonebook(args) => report::handle_phonebook(&mut store, args),
        Commands::Export(args) => report::handle_export(&mut store, args),
        Commands::Storage(args) => report::handle_storage(&store, args),
    }
}

/// Store warnings go to stderr so `--json` output on stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_env("LEADFLOW_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
