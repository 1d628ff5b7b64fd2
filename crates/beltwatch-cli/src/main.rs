//! Beltwatch CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beltwatch_cli::{cli::Cli, commands::CommandDispatcher, config::BeltwatchConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_configuration(&cli)?;

    CommandDispatcher::execute(cli, config)
        .await
        .context("Command execution failed")?;
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` overrides both
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_configuration(cli: &Cli) -> anyhow::Result<BeltwatchConfig> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            BeltwatchConfig::load_from_file(path)
        }
        None => BeltwatchConfig::load(),
    };
    config.context("Invalid configuration")
}
