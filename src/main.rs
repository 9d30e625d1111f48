//! halo-stats - Halo Infinite stats tools over stdio
//!
//! Signs in with a Microsoft account, keeps the Halo credentials in an
//! encrypted local file, and serves player stats as JSON-RPC tools.

mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hs_auth::{
    AuthConfig, FileTokenStore, HaloAuthClient, MachineSecretProvider, SessionCache, TokenManager,
};
use hs_config::AppConfig;
use hs_stats::{HaloStatsClient, StatsConfig};
use serde_json::json;
use tracing::info;

use crate::tools::HaloTools;
use crate::tools::handlers::{GET_CAREER_RANK, GET_SERVICE_RECORD};

#[derive(Parser)]
#[command(name = "halo-stats")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.toml (default: platform config directory)
    #[arg(long, global = true, env = "HALO_STATS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tools as newline-delimited JSON-RPC on stdin/stdout
    Serve,

    /// Sign in now and store the credentials
    Auth,

    /// Run a single tool and print its result
    Call {
        /// Tool name, e.g. get_career_rank
        tool: String,

        /// Gamertag for player lookups
        #[arg(long)]
        gamertag: Option<String>,
    },
}

fn init_tracing() {
    use tracing_subscriber::prelude::*;

    // stdout carries the JSON-RPC stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                ),
        )
        .init();
}

fn build_token_manager(config: &AppConfig) -> Result<TokenManager> {
    let mut auth_config = AuthConfig::new(config.client_id.clone(), config.redirect_uri.clone())
        .with_callback_timeout(config.callback_timeout);
    if let Some(user_agent) = &config.user_agent {
        auth_config.user_agent = Some(user_agent.clone());
    }
    let client = HaloAuthClient::new(auth_config).context("Failed to create auth client")?;

    let token_path = match &config.token_path {
        Some(path) => path.clone(),
        None => FileTokenStore::default_path()?,
    };
    info!("Using token store at {}", token_path.display());
    let store = FileTokenStore::new(token_path, Arc::new(MachineSecretProvider));

    Ok(TokenManager::new(
        Arc::new(client),
        Arc::new(store),
        SessionCache::new(),
    ))
}

fn build_stats_client(config: &AppConfig) -> Result<HaloStatsClient> {
    let mut stats_config = StatsConfig::default();
    if let Some(user_agent) = &config.user_agent {
        stats_config.user_agent = user_agent.clone();
    }
    HaloStatsClient::new(stats_config).context("Failed to create stats client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = hs_config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    let halo = HaloTools::new(build_token_manager(&config)?, build_stats_client(&config)?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            tools::server::serve(&halo, stdin, tokio::io::stdout()).await
        }
        Commands::Auth => {
            let result = halo.call(tools::handlers::AUTHENTICATE, None).await;
            eprintln!("{}", result.text());
            if result.is_error {
                anyhow::bail!("Sign-in failed");
            }
            Ok(())
        }
        Commands::Call { tool, gamertag } => {
            let arguments = match tool.as_str() {
                GET_CAREER_RANK | GET_SERVICE_RECORD => Some(json!({ "gamertag": gamertag })),
                _ => None,
            };
            let result = halo.call(&tool, arguments).await;
            println!("{}", result.text());
            if result.is_error {
                anyhow::bail!("Tool {} failed", tool);
            }
            Ok(())
        }
    }
}
