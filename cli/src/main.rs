//! `docchat` console client.

mod command;
mod render;
mod repl;

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use docchat_client::ConfigLoader;
use docchat_client::DocChatClient;
use docchat_client::SessionController;
use tracing_subscriber::EnvFilter;

use crate::render::Palette;
use crate::repl::Repl;

/// Ask questions about your PDF documents.
#[derive(Debug, Parser)]
#[command(name = "docchat", version)]
struct Cli {
    /// TOML configuration file. Defaults to ./docchat.toml or the user config directory.
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// Backend URL, e.g. http://localhost:8000. Overrides the configuration.
    #[arg(long = "base-url")]
    base_url: Option<String>,

    /// Log request details to stderr.
    #[arg(long = "verbose", short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::new().with_file(path).load(),
        None => ConfigLoader::load_default(),
    }
    .context("failed to load configuration")?;
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
        config.validate().context("invalid --base-url")?;
    }
    tracing::debug!(base_url = %config.base_url, "configuration loaded");

    let client = DocChatClient::new(&config).context("failed to build HTTP client")?;
    let controller = SessionController::new(client);
    Repl::new(controller, Palette::detect()).run().await
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
