//! Trading session repository.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use vtm_core::{SessionStatus, TradingSession};

const SESSION_COLUMNS: &str = "id, user_id, started_at, last_heartbeat, status";

fn session_from_row(row: &PgRow) -> Result<TradingSession> {
    let status: String = row.try_get("status")?;
    Ok(TradingSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        started_at: row.try_get("started_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown session status: {status}"))?,
    })
}

/// Repository for `trading_sessions` rows.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Renews the newest non-closed session for the user, or opens one.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn touch(&self, user_id: i64, at: DateTime<Utc>) -> Result<TradingSession> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT id FROM trading_sessions
            WHERE user_id = $1 AND status <> 'closed'
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match existing {
            Some((id,)) => {
                sqlx::query(&format!(
                    r"
                    UPDATE trading_sessions
                    SET last_heartbeat = $2, status = 'active'
                    WHERE id = $1
                    RETURNING {SESSION_COLUMNS}
                    "
                ))
                .bind(id)
                .bind(at)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r"
                    INSERT INTO trading_sessions (user_id, started_at, last_heartbeat, status)
                    VALUES ($1, $2, $2, 'active')
                    RETURNING {SESSION_COLUMNS}
                    "
                ))
                .bind(user_id)
                .bind(at)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let session = session_from_row(&row)?;
        tx.commit().await?;
        Ok(session)
    }

    /// Sessions in any of the given statuses.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn with_status(&self, statuses: &[SessionStatus]) -> Result<Vec<TradingSession>> {
        let statuses: Vec<&str> = statuses.iter().map(SessionStatus::as_str).collect();
        let rows = sqlx::query(&format!(
            r"
            SELECT {SESSION_COLUMNS}
            FROM trading_sessions
            WHERE status = ANY($1)
            ORDER BY last_heartbeat ASC, id ASC
            "
        ))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }

    /// Sets a session's status.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn set_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        sqlx::query("UPDATE trading_sessions SET status = $2 WHERE id = $1")
            .bind(session_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Closes all of a user's open sessions.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn close_for_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE trading_sessions SET status = 'closed' WHERE user_id = $1 AND status <> 'closed'",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
