//! azcred CLI
//!
//! Command-line interface for fetching Azure access tokens through the
//! credentials configured in `credentials.toml`.
//!
//! # Usage
//!
//! ```bash
//! # Print a Key Vault token from the default credential
//! azcred token https://vault.azure.net/.default
//!
//! # Bypass the cache and print the whole token as JSON
//! azcred token https://graph.microsoft.com/.default -c app --no-cache --json
//!
//! # Drop a cached token
//! azcred forget https://vault.azure.net/.default
//!
//! # Show which driver a credential uses
//! azcred driver -c app
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use azcred_core::{CredentialManager, CredentialsConfig, DriverFactory, Scope};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "azcred")]
#[command(about = "Fetch and cache Azure access tokens")]
#[command(version)]
struct Cli {
    /// Path to credentials.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an access token
    Token {
        /// Scopes to request (e.g., https://vault.azure.net/.default)
        #[arg(required = true)]
        scopes: Vec<String>,

        /// Credential name
        #[arg(short, long)]
        credential: Option<String>,

        /// Fetch a new token without reading or writing the durable cache
        #[arg(short = 'C', long)]
        no_cache: bool,

        /// Print the token with its metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the cached token for a scope
    Forget {
        /// Scopes of the cached token
        #[arg(required = true)]
        scopes: Vec<String>,

        /// Credential name
        #[arg(short, long)]
        credential: Option<String>,
    },

    /// Print the driver a credential uses
    Driver {
        /// Credential name
        #[arg(short, long)]
        credential: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => CredentialsConfig::load_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => CredentialsConfig::load().context("failed to load configuration")?,
    };
    debug!(path = ?config.config_path, "Loaded configuration");

    let manager = CredentialManager::new(config, DriverFactory::default());

    match cli.command {
        Commands::Token { scopes, credential, no_cache, json } => {
            get_token(&manager, Scope::new(scopes), credential.as_deref(), no_cache, json).await
        }
        Commands::Forget { scopes, credential } => {
            forget_token(&manager, Scope::new(scopes), credential.as_deref()).await
        }
        Commands::Driver { credential } => {
            show_driver(&manager, credential.as_deref())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn get_token(
    manager: &CredentialManager,
    scope: Scope,
    credential: Option<&str>,
    no_cache: bool,
    json: bool,
) -> Result<()> {
    let token = if no_cache {
        manager.refresh_token(&scope, credential, false).await?
    } else {
        manager.token(&scope, credential).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&token)?);
    } else {
        println!("{}", token.expose());
    }
    Ok(())
}

async fn forget_token(manager: &CredentialManager, scope: Scope, credential: Option<&str>) -> Result<()> {
    manager.forget_token(&scope, credential, true).await?;
    eprintln!("Forgot token for {}", scope);
    Ok(())
}

fn show_driver(manager: &CredentialManager, credential: Option<&str>) -> Result<()> {
    let driver = manager.driver(credential)?;
    println!("{}", driver.name());
    Ok(())
}
