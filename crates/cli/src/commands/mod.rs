//! Subcommand implementations.

mod enqueue;
mod migrate;
mod run;
mod run_once;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use vtm_broker::{DeadlineGateway, PaperBroker};
use vtm_core::{AppConfig, BrokerGateway, Repository};
use vtm_data::PgRepository;

pub use enqueue::{run_enqueue, EnqueueArgs};
pub use migrate::{run_migrate, MigrateArgs};
pub use run::{run_scheduler, RunArgs};
pub use run_once::{run_once, JobKind, RunOnceArgs};

/// Connects to `PostgreSQL` and checks the connection before anything is scheduled.
async fn connect_repository(config: &AppConfig) -> Result<Arc<dyn Repository>> {
    let pool = vtm_data::connect(&config.database).await?;
    let repo = PgRepository::new(pool);
    repo.ping()
        .await
        .context("Repository unreachable at startup")?;
    info!(max_connections = config.database.max_connections, "Connected to database");
    Ok(Arc::new(repo))
}

/// Paper broker behind the per-call deadline.
fn paper_gateway(config: &AppConfig) -> Arc<dyn BrokerGateway> {
    let paper = PaperBroker::new(config.broker.paper.clone())
        .with_retention(config.monitor.max_open_duration() * 2);
    Arc::new(DeadlineGateway::new(paper, config.broker.request_timeout()))
}
