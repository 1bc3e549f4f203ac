//! Conduit daemon - unbuffered streaming relay in front of the inference API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use conduit::auth::TokenManager;
use conduit::config::Config;
use conduit::error::Result;
use conduit::relay::StreamRelay;
use conduit::server::RelayServer;

/// Conduit - streams inference output to clients without buffering
#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "An unbuffered streaming relay in front of a token-authenticated inference API")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,conduit=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Conduit daemon");

    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    let credentials = Arc::new(config.credentials()?);
    let tokens = Arc::new(TokenManager::new(credentials, config.auth.clone())?);

    tracing::info!("Acquiring initial auth token");
    tokens.get_token().await?;

    let relay = Arc::new(StreamRelay::new(
        tokens,
        Duration::from_secs(config.upstream.connect_timeout_secs),
    ));

    let server = RelayServer::new(config.server.clone(), relay, config.relay.clone());
    server.serve().await?;

    tracing::info!("Conduit daemon stopped");
    Ok(())
}
