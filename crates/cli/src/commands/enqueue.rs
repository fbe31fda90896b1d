use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde_json::Value as JsonValue;
use tracing::info;

use vtm_core::{ConfigLoader, TradeInstruction, DEFAULT_CONFIG_PATH};
use vtm_data::PgRepository;

#[derive(Args, Debug, Clone)]
pub struct EnqueueArgs {
    /// Signal payload, e.g. '{"asset": "R_100", "direction": "CALL"}'
    pub payload: String,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Enqueue even if the payload would be rejected
    #[arg(long)]
    pub force: bool,
}

/// Parses the payload and enqueues it for the signal pipeline.
///
/// # Errors
/// Returns an error if the payload is not JSON, fails validation without
/// `--force`, or the insert fails.
pub async fn run_enqueue(args: EnqueueArgs) -> Result<()> {
    let payload: JsonValue =
        serde_json::from_str(&args.payload).context("Signal payload is not valid JSON")?;
    if !args.force {
        TradeInstruction::from_payload(&payload)?;
    }

    let config = ConfigLoader::load(&args.config)?;
    let pool = vtm_data::connect(&config.database).await?;
    let repo = PgRepository::new(pool);

    let id = repo.signals.insert(&payload, Utc::now()).await?;
    info!(signal_id = id, "Signal enqueued");
    println!("{id}");
    Ok(())
}
