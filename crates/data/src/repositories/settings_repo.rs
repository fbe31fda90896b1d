//! User settings repository.
//!
//! Risk thresholds and the daily accumulators live in one row per user.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use vtm_core::UserSettings;

pub(crate) const SETTINGS_COLUMNS: &str =
    "user_id, stake, target, stop_limit, is_bot_active, daily_profit, daily_loss, reset_date";

pub(crate) fn settings_from_row(row: &PgRow) -> Result<UserSettings> {
    Ok(UserSettings {
        user_id: row.try_get("user_id")?,
        stake: row.try_get("stake")?,
        target: row.try_get("target")?,
        stop_limit: row.try_get("stop_limit")?,
        is_bot_active: row.try_get("is_bot_active")?,
        daily_profit: row.try_get("daily_profit")?,
        daily_loss: row.try_get("daily_loss")?,
        reset_date: row.try_get("reset_date")?,
    })
}

/// Repository for `settings` rows.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Settings of every user whose bot is active.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn active(&self) -> Result<Vec<UserSettings>> {
        let rows = sqlx::query(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM settings WHERE is_bot_active ORDER BY user_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(settings_from_row).collect()
    }

    /// Gets one user's settings.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, user_id: i64) -> Result<Option<UserSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM settings WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(settings_from_row).transpose()
    }

    /// Zeroes the accumulators if `reset_date` has not moved since it was read.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn reset_daily(
        &self,
        user_id: i64,
        expected_reset_date: NaiveDate,
        next_reset_date: NaiveDate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE settings
            SET daily_profit = 0, daily_loss = 0, reset_date = $3, updated_at = NOW()
            WHERE user_id = $1 AND reset_date = $2
            ",
        )
        .bind(user_id)
        .bind(expected_reset_date)
        .bind(next_reset_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Turns the user's bot off.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn disable_bot(&self, user_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE settings SET is_bot_active = FALSE, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
