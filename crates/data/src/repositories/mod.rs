//! PostgreSQL repositories.
//!
//! Each repository provides typed access to one table. [`PgRepository`] bundles
//! them behind the [`Repository`] capability the jobs consume.

pub mod session_repo;
pub mod settings_repo;
pub mod signal_repo;
pub mod trade_repo;

pub use session_repo::SessionRepository;
pub use settings_repo::SettingsRepository;
pub use signal_repo::SignalRepository;
pub use trade_repo::TradeRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;

use vtm_core::{
    NewTrade, Repository, SessionStatus, Settlement, Signal, Trade, TradeStatus, TradingSession,
    UserSettings,
};

/// All table repositories over a single pool.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
    pub settings: SettingsRepository,
    pub signals: SignalRepository,
    pub trades: TradeRepository,
    pub sessions: SessionRepository,
}

impl PgRepository {
    /// Creates the repository set from a database pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            settings: SettingsRepository::new(pool.clone()),
            signals: SignalRepository::new(pool.clone()),
            trades: TradeRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            pool,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn maintenance(&self) -> Result<()> {
        sqlx::query("ANALYZE signals, trades, trading_sessions")
            .execute(&self.pool)
            .await?;
        debug!("Analyzed hot tables");
        Ok(())
    }

    async fn active_settings(&self) -> Result<Vec<UserSettings>> {
        self.settings.active().await
    }

    async fn settings(&self, user_id: i64) -> Result<Option<UserSettings>> {
        self.settings.get(user_id).await
    }

    async fn apply_daily_reset(
        &self,
        user_id: i64,
        expected_reset_date: NaiveDate,
        next_reset_date: NaiveDate,
    ) -> Result<bool> {
        self.settings
            .reset_daily(user_id, expected_reset_date, next_reset_date)
            .await
    }

    async fn disable_bot(&self, user_id: i64) -> Result<()> {
        self.settings.disable_bot(user_id).await
    }

    async fn unprocessed_signals(&self, limit: usize) -> Result<Vec<Signal>> {
        self.signals.unprocessed(limit).await
    }

    async fn count_unprocessed_signals(&self) -> Result<u64> {
        self.signals.count_unprocessed().await
    }

    async fn mark_signal_processed(&self, signal_id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.signals.mark_processed(signal_id, at).await
    }

    async fn delete_signals_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.signals.delete_older_than(cutoff).await
    }

    async fn has_live_trade(&self, user_id: i64) -> Result<bool> {
        self.trades.has_live(user_id).await
    }

    async fn insert_pending_trade(&self, trade: &NewTrade) -> Result<Trade> {
        self.trades.insert_pending(trade).await
    }

    async fn mark_trade_open(&self, trade_id: i64, order_id: &str) -> Result<()> {
        self.trades.mark_open(trade_id, order_id).await
    }

    async fn discard_pending_trade(&self, trade_id: i64) -> Result<()> {
        self.trades.discard_pending(trade_id).await
    }

    async fn trades_with_status(&self, status: TradeStatus) -> Result<Vec<Trade>> {
        self.trades.with_status(status).await
    }

    async fn recent_closed_trades(&self, user_id: i64, limit: usize) -> Result<Vec<Trade>> {
        self.trades.recent_closed(user_id, limit).await
    }

    async fn settle_trade(&self, settlement: &Settlement) -> Result<Option<UserSettings>> {
        self.trades.settle(settlement).await
    }

    async fn fail_trade(&self, trade_id: i64, at: DateTime<Utc>) -> Result<bool> {
        self.trades.fail(trade_id, at).await
    }

    async fn touch_session(&self, user_id: i64, at: DateTime<Utc>) -> Result<TradingSession> {
        self.sessions.touch(user_id, at).await
    }

    async fn sessions_with_status(&self, statuses: &[SessionStatus]) -> Result<Vec<TradingSession>> {
        self.sessions.with_status(statuses).await
    }

    async fn set_session_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        self.sessions.set_status(session_id, status).await
    }

    async fn close_sessions_for_user(&self, user_id: i64) -> Result<u64> {
        self.sessions.close_for_user(user_id).await
    }
}
