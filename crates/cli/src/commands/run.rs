use anyhow::Result;
use clap::Args;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use vtm_core::{ConfigLoader, DEFAULT_CONFIG_PATH};
use vtm_scheduler::Components;

use super::{connect_repository, paper_gateway};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Runs the scheduler until SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the signal handlers cannot be installed.
pub async fn run_scheduler(args: RunArgs) -> Result<()> {
    info!(config = %args.config, "Starting trading automation");
    let config = ConfigLoader::load(&args.config)?;

    let repo = connect_repository(&config).await?;
    let broker = paper_gateway(&config);
    let mut scheduler = Components::new(repo, broker, &config).scheduler(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Ctrl+C handler failed, shutting down"),
            },
        }
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;

    info!("Trading automation stopped");
    Ok(())
}
