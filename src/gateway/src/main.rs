//! Warden - IAM authorization worker and enforcement proxy

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_gateway::{observability, server, GatewayConfig, Role};

/// Warden CLI
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "IAM authorization worker and enforcement proxy")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/warden/warden.toml", env = "WARDEN_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the authorization API
    Worker,

    /// Run the enforcement proxy
    Proxy,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GatewayConfig::load(&cli.config)?;
    observability::init_tracing(&config.logging.level, cli.verbose)?;
    config.validate()?;

    let role = match cli.command {
        Command::Worker => Role::Worker,
        Command::Proxy => Role::Proxy,
        Command::CheckConfig => {
            println!("Configuration {} is valid", cli.config.display());
            return Ok(());
        }
    };

    info!(
        ?role,
        config = %cli.config.display(),
        "Starting warden v{}",
        env!("CARGO_PKG_VERSION")
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            server::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    server::run(config, role, shutdown).await
}
