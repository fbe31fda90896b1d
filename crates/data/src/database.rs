use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use vtm_core::DatabaseConfig;

/// Tables the jobs cannot run without.
pub const REQUIRED_TABLES: [&str; 5] = ["users", "settings", "signals", "trades", "trading_sessions"];

/// Result of checking one required table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCheck {
    pub table: &'static str,
    pub exists: bool,
}

/// Opens a connection pool to the configured `PostgreSQL` database.
///
/// # Errors
/// Returns an error if the database connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    Ok(pool)
}

/// Applies the embedded migrations.
///
/// # Errors
/// Returns an error if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    info!("Migrations applied");
    Ok(())
}

/// Reports whether each of [`REQUIRED_TABLES`] exists in the current schema.
///
/// # Errors
/// Returns an error if the catalog query fails.
pub async fn verify_schema(pool: &PgPool) -> Result<Vec<TableCheck>> {
    let names: Vec<String> = REQUIRED_TABLES.iter().map(|t| (*t).to_string()).collect();
    let present: Vec<(String,)> = sqlx::query_as(
        r"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = ANY($1)
        ",
    )
    .bind(&names)
    .fetch_all(pool)
    .await?;

    Ok(REQUIRED_TABLES
        .iter()
        .map(|table| TableCheck {
            table,
            exists: present.iter().any(|(name,)| name == table),
        })
        .collect())
}

/// Fails with the list of missing tables, if any.
///
/// # Errors
/// Returns an error naming every missing table.
pub fn ensure_complete(checks: &[TableCheck]) -> Result<()> {
    let missing: Vec<&str> = checks
        .iter()
        .filter(|c| !c.exists)
        .map(|c| c.table)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Missing tables: {}", missing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_complete_lists_missing_tables() {
        let checks: Vec<TableCheck> = REQUIRED_TABLES
            .iter()
            .map(|table| TableCheck {
                table,
                exists: *table != "signals" && *table != "trading_sessions",
            })
            .collect();

        let err = ensure_complete(&checks).unwrap_err();
        assert_eq!(err.to_string(), "Missing tables: signals, trading_sessions");
    }

    #[test]
    fn test_ensure_complete_passes_when_all_present() {
        let checks: Vec<TableCheck> = REQUIRED_TABLES
            .iter()
            .map(|table| TableCheck {
                table,
                exists: true,
            })
            .collect();
        assert!(ensure_complete(&checks).is_ok());
    }
}
