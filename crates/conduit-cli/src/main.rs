use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use conduit::auth::TokenManager;
use conduit::config::Config;
use conduit::relay::StreamRelay;
use conduit_cli::commands::{StreamCommand, TokenCommand};
use conduit_cli::error::CliResult;
use conduit_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conduit-cli")]
#[command(about = "Conduit CLI - Talk to the upstream API the way the relay does")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, short, global = true, help = "Log relay activity to stderr")]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Acquire a bearer token and show its expiry")]
    Token(TokenCommand),

    #[clap(about = "Relay one message and print the response as it streams")]
    Stream(StreamCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let config = Config::load(cli.config.as_deref())?;
    let credentials = Arc::new(config.credentials()?);
    let tokens = Arc::new(TokenManager::new(credentials, config.auth.clone())?);

    match &cli.command {
        Command::Token(cmd) => cmd.execute(&tokens, format).await,
        Command::Stream(cmd) => {
            let relay = StreamRelay::new(
                tokens,
                Duration::from_secs(config.upstream.connect_timeout_secs),
            );
            cmd.execute(&relay, &config.relay, format).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info,conduit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries relay output, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
