//! tally - chat agent for a Bitcoin ledger canister
//!
//! Subcommands:
//! - `tally serve` - Speak the chat protocol as JSON lines on stdin/stdout
//! - `tally ask <text>` - Answer one query and print the reply
//! - `tally catalog` - Print the operation schemas given to the model
//! - `tally config` - Print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tallyconf::TallyConfig;
use tracing_subscriber::EnvFilter;

use tally::{Catalog, LedgerClient, OpenAiResolver, Orchestrator, SessionHandler};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Natural-language chat agent for a Bitcoin ledger canister")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./tally.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chat protocol over stdin/stdout
    Serve,

    /// Answer a single query
    Ask {
        /// Natural-language request, e.g. "What's the balance of tb1q..."
        text: String,
    },

    /// Print the operation catalog as JSON
    Catalog,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = TallyConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // stdout carries protocol frames and replies; logs go to stderr
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "Configuration loaded");

    match cli.command {
        Commands::Serve => {
            let orchestrator = build_orchestrator(&config)?;
            tally::stdio::run(|outbox| SessionHandler::new(orchestrator, Arc::new(outbox))).await?;
        }
        Commands::Ask { text } => {
            let orchestrator = build_orchestrator(&config)?;
            println!("{}", orchestrator.answer(&text).await);
        }
        Commands::Catalog => {
            let catalog = Catalog::ledger();
            let listing: Vec<_> = catalog
                .list()
                .iter()
                .map(|op| {
                    serde_json::json!({
                        "name": op.name,
                        "description": op.description,
                        "parameters": op.json_schema(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}

fn build_orchestrator(config: &TallyConfig) -> Result<Arc<Orchestrator>> {
    if config.llm.api_key.is_none() {
        tracing::warn!("No API key configured; set OPENAI_API_KEY or llm.api_key");
    }

    let catalog = Arc::new(Catalog::ledger());
    let ledger = LedgerClient::new(&config.ledger, Arc::clone(&catalog))?;
    let resolver = Arc::new(OpenAiResolver::new(&config.llm));

    tracing::info!(
        ledger = %config.ledger.base_url,
        model = %config.llm.model,
        "Agent ready"
    );

    Ok(Arc::new(Orchestrator::new(catalog, resolver, ledger)))
}
