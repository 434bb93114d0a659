use anyhow::Context;
use clap::{Parser, Subcommand};
use configuration::{Backend, Settings, init_tracing, load_config};
use database::{ObscuringCodec, Persistent, SqlPersistent};
use std::path::PathBuf;

mod retention;

/// The main entry point for the clusterstore admin tool.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let mut settings = load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(backend) = cli.backend {
        settings.store.backend = backend;
        settings.store = settings.store.normalize();
    }
    let _log_guard = init_tracing(&settings.log)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Init => handle_init(&settings).await,
        Commands::TrimHistory(args) => handle_trim_history(&settings, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Administration for the cluster configuration store.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the backend from the configuration file.
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the store and create the schema if it is missing.
    Init,
    /// Drop the oldest query history entries until at most `keep` remain.
    TrimHistory(TrimArgs),
}

#[derive(Parser)]
struct TrimArgs {
    /// Number of history entries to retain.
    #[arg(long, default_value_t = 10_000)]
    keep: i64,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn open_store(settings: &Settings) -> anyhow::Result<SqlPersistent> {
    let codec = ObscuringCodec::from_secret(settings.codec.secret.as_deref());
    let store = SqlPersistent::init(&settings.store, codec)
        .await
        .with_context(|| format!("Failed to open {}", settings.store.redacted_target()))?;
    Ok(store)
}

async fn handle_init(settings: &Settings) -> anyhow::Result<()> {
    let mut store = open_store(settings).await?;
    let clusters = store.get_all_clusters().await?.len();
    let logic = store.get_all_logic_clusters().await?.len();
    let history = store.get_query_history_count().await;
    tracing::info!(clusters, logic, history, "Store is ready.");
    store.close().await;
    Ok(())
}

async fn handle_trim_history(settings: &Settings, args: TrimArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.keep >= 0, "--keep must not be negative");
    let mut store = open_store(settings).await?;
    let removed = retention::trim_history(&mut store, args.keep).await?;
    tracing::info!(removed, keep = args.keep, "Query history trimmed.");
    store.close().await;
    Ok(())
}
