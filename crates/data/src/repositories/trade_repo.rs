//! Trade repository.
//!
//! Owns the trade lifecycle writes, including the settlement transaction that
//! closes a trade and credits the owner's daily accumulators together.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use vtm_core::{Direction, NewTrade, Settlement, Trade, TradeStatus, UserSettings};

use super::settings_repo::{settings_from_row, SETTINGS_COLUMNS};

const TRADE_COLUMNS: &str =
    "id, user_id, signal_id, order_id, asset, stake, direction, status, opened_at, closed_at, pnl";

fn trade_from_row(row: &PgRow) -> Result<Trade> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;

    Ok(Trade {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        signal_id: row.try_get("signal_id")?,
        order_id: row.try_get("order_id")?,
        asset: row.try_get("asset")?,
        stake: row.try_get("stake")?,
        direction: Direction::parse(&direction)
            .ok_or_else(|| anyhow!("Unknown trade direction: {direction}"))?,
        status: TradeStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown trade status: {status}"))?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        pnl: row.try_get("pnl")?,
    })
}

/// Repository for `trades` rows.
#[derive(Debug, Clone)]
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// True if the user has a pending or open trade.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn has_live(&self, user_id: i64) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM trades WHERE user_id = $1 AND status IN ('pending', 'open')
            )
            ",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Reserves the user's live-trade slot with a `pending` row.
    ///
    /// The partial unique index on `(user_id) WHERE status IN ('pending', 'open')`
    /// rejects a second reservation.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including when the user already
    /// holds a live trade.
    pub async fn insert_pending(&self, trade: &NewTrade) -> Result<Trade> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO trades (user_id, signal_id, asset, stake, direction, status, opened_at, pnl)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, 0)
            RETURNING {TRADE_COLUMNS}
            "
        ))
        .bind(trade.user_id)
        .bind(trade.signal_id)
        .bind(&trade.asset)
        .bind(trade.stake)
        .bind(trade.direction.as_str())
        .bind(trade.opened_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to reserve trade for user {}", trade.user_id))?;

        trade_from_row(&row)
    }

    /// Moves a pending trade to `open`.
    ///
    /// # Errors
    /// Returns an error if the update fails or the trade was not pending.
    pub async fn mark_open(&self, trade_id: i64, order_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE trades SET status = 'open', order_id = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(trade_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Trade {trade_id} is no longer pending");
        }
        Ok(())
    }

    /// Deletes a pending reservation.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn discard_pending(&self, trade_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM trades WHERE id = $1 AND status = 'pending'")
            .bind(trade_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Trades in one status, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn with_status(&self, status: TradeStatus) -> Result<Vec<Trade>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE status = $1 ORDER BY opened_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    /// The user's latest won/lost trades, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent_closed(&self, user_id: i64, limit: usize) -> Result<Vec<Trade>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE user_id = $1 AND status IN ('won', 'lost')
            ORDER BY closed_at DESC, id DESC
            LIMIT $2
            "
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    /// Closes an open trade and credits its P&L to the owner in one transaction.
    ///
    /// Returns `None` without writing if the trade is no longer open.
    ///
    /// # Errors
    /// Returns an error if either write fails or the owner has no settings row;
    /// the transaction is rolled back in both cases.
    pub async fn settle(&self, settlement: &Settlement) -> Result<Option<UserSettings>> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            r"
            UPDATE trades
            SET status = $2, closed_at = $3, pnl = $4
            WHERE id = $1 AND status = 'open'
            ",
        )
        .bind(settlement.trade_id)
        .bind(settlement.outcome.status().as_str())
        .bind(settlement.closed_at)
        .bind(settlement.pnl)
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(trade_id = settlement.trade_id, "Trade already settled");
            return Ok(None);
        }

        let profit = settlement.pnl.max(Decimal::ZERO);
        let loss = (-settlement.pnl).max(Decimal::ZERO);

        let row = sqlx::query(&format!(
            r"
            UPDATE settings
            SET daily_profit = daily_profit + $2,
                daily_loss = daily_loss + $3,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {SETTINGS_COLUMNS}
            "
        ))
        .bind(settlement.user_id)
        .bind(profit)
        .bind(loss)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            anyhow::bail!(
                "No settings for user {} while settling trade {}",
                settlement.user_id,
                settlement.trade_id
            );
        };
        let settings = settings_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(settings))
    }

    /// Forces a live trade to `error` with zero P&L.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn fail(&self, trade_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE trades
            SET status = 'error', closed_at = $2, pnl = 0
            WHERE id = $1 AND status IN ('pending', 'open')
            ",
        )
        .bind(trade_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
