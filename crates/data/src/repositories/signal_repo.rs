//! Signal queue repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use vtm_core::Signal;

/// Repository for the `signals` queue.
#[derive(Debug, Clone)]
pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueues a signal and returns its ID.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, payload: &JsonValue, created_at: DateTime<Utc>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO signals (payload, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(payload)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Oldest unprocessed signals first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn unprocessed(&self, limit: usize) -> Result<Vec<Signal>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT id, payload, created_at, processed_at
            FROM signals
            WHERE processed_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut signals = Vec::with_capacity(rows.len());
        for row in rows {
            signals.push(Signal {
                id: row.try_get("id")?,
                payload: row.try_get("payload")?,
                created_at: row.try_get("created_at")?,
                processed_at: row.try_get("processed_at")?,
            });
        }
        Ok(signals)
    }

    /// Number of signals still waiting.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn count_unprocessed(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signals WHERE processed_at IS NULL")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Claims a signal. Only the first caller sees `true`.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn mark_processed(&self, signal_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE signals SET processed_at = $2 WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(signal_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes every signal created before `cutoff`.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM signals WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
