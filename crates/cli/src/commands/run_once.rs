use anyhow::Result;
use clap::{Args, ValueEnum};
use serde_json::json;

use vtm_core::{ConfigLoader, DEFAULT_CONFIG_PATH};
use vtm_scheduler::Components;

use super::{connect_repository, paper_gateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobKind {
    /// Trading loop and stale-session cleanup
    Trading,
    /// One batch of the signal pipeline
    Signals,
    /// Contract monitor. Paper contracts live in memory, so across processes
    /// this only expires overdue trades.
    Contracts,
    /// Health check only
    Health,
}

#[derive(Args, Debug, Clone)]
pub struct RunOnceArgs {
    #[arg(value_enum)]
    pub job: JobKind,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

/// Executes one job against the configured database and prints its report
/// as JSON on stdout.
///
/// # Errors
/// Returns an error if the database is unreachable or the job fails.
pub async fn run_once(args: RunOnceArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)?;
    let repo = connect_repository(&config).await?;
    let components = Components::new(repo, paper_gateway(&config), &config);

    let report = match args.job {
        JobKind::Trading => {
            let trading = components.engine.process_trading_loop().await?;
            let sessions = components.engine.cleanup_stale_sessions().await?;
            json!({ "trading": trading, "sessions": sessions })
        }
        JobKind::Signals => {
            let pipeline = components
                .pipeline
                .process_unprocessed_signals(config.signals.batch_size)
                .await?;
            serde_json::to_value(pipeline)?
        }
        JobKind::Contracts => {
            serde_json::to_value(components.monitor.process_contract_results().await?)?
        }
        JobKind::Health => serde_json::to_value(components.engine.perform_health_check().await)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
