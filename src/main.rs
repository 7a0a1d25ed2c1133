use anyhow::{bail, Context};
use clap::Parser;
use hades::cli::{self, Cli, Commands};
use hades::config::{AppConfig, StorageConfig};
use hades::fleet::FleetOrchestrator;
use hades::transport::{MessageHandler, StdoutPublisher};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from("config", cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.storage = StorageConfig::under(dir);
    }

    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    match cli.command {
        Commands::Run => run_mode(config).await?,
        Commands::Observe {
            device,
            measurement,
        } => {
            let fleet = FleetOrchestrator::new(config);
            cli::observe_once(&fleet, &device, measurement).await?;
        }
        Commands::Model { device } => {
            let fleet = FleetOrchestrator::new(config);
            cli::show_model(&fleet, &device)?;
        }
    }

    Ok(())
}

async fn run_mode(config: AppConfig) -> anyhow::Result<()> {
    let transport = config.transport.clone();
    info!(
        prefix = %transport.topic_prefix,
        state_dir = %config.storage.state_dir.display(),
        "Starting message loop on stdin"
    );

    let fleet = Arc::new(FleetOrchestrator::new(config));
    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&fleet),
        Arc::new(StdoutPublisher::new()),
        transport,
    ));

    let input = BufReader::new(tokio::io::stdin());
    let handled = cli::run_lines(handler, input, shutdown_signal()).await?;

    info!(handled, devices = fleet.devices().len(), "Message loop stopped");
    info!("{}", fleet.metrics().summary());
    Ok(())
}
