use anyhow::Result;
use clap::Args;

use vtm_core::{ConfigLoader, DEFAULT_CONFIG_PATH};

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Only verify the schema, do not apply migrations
    #[arg(long)]
    pub check: bool,
}

/// Applies the embedded migrations, then reports each required table.
///
/// # Errors
/// Returns an error if a migration fails or any required table is missing.
pub async fn run_migrate(args: MigrateArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)?;
    let pool = vtm_data::connect(&config.database).await?;

    if !args.check {
        vtm_data::run_migrations(&pool).await?;
    }

    let checks = vtm_data::verify_schema(&pool).await?;
    for check in &checks {
        let mark = if check.exists { "ok" } else { "MISSING" };
        println!("{:<18} {}", check.table, mark);
    }

    vtm_data::ensure_complete(&checks)
}
