//! OMNI CLI: entry point.
//!
//! # Commands
//!
//! - `omni providers`: list registered provider names
//! - `omni status`: show configuration and provider availability
//! - `omni complete PROMPT [--stream]`: one completion from the active provider
//! - `omni embed TEXT...`: embedding vectors
//! - `omni health`: run the provider's health check
//! - `omni models`: list models served by a local server

mod generate;
mod helpers;
mod probe;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use omni_core::config::{load_config, Config};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// OMNI: one interface to OpenAI, Anthropic and local LLM servers
#[derive(Parser)]
#[command(name = "omni", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.omni/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Provider selection shared by every command that talks to a backend.
#[derive(Args, Clone, Debug, Default)]
pub struct ProviderArgs {
    /// Provider name or alias (overrides `llm.provider`)
    #[arg(short, long)]
    pub provider: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered provider names
    Providers,

    /// Show configuration and provider status
    Status,

    /// Generate a completion
    Complete(generate::CompleteArgs),

    /// Embed one or more texts
    Embed(generate::EmbedArgs),

    /// Check whether the provider can serve requests
    Health {
        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// List models served by a local LLM server
    Models {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    let config_path = cli.config.as_deref().map(helpers::expand_tilde);
    let config = load(config_path);

    match cli.command {
        Commands::Providers => {
            probe::list_providers();
            Ok(())
        }
        Commands::Status => status::run(&config),
        Commands::Complete(args) => generate::complete(&config, args).await,
        Commands::Embed(args) => generate::embed(&config, args).await,
        Commands::Health { provider } => probe::health(&config, &provider).await,
        Commands::Models { provider } => probe::models(&config, &provider).await,
    }
}

fn load(path: Option<PathBuf>) -> Config {
    load_config(path.as_deref())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("omni=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
