use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::BrokerError;
use crate::models::{
    ContractStatus, NewTrade, OrderAck, OrderRequest, SessionStatus, Settlement, Signal, Trade,
    TradeStatus, TradingSession, UserSettings,
};

/// Persistence capability consumed by the jobs.
///
/// Every method is a single unit of work. Methods that touch more than one row
/// or table must commit all of their writes or none of them.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Connectivity check. Failing at startup is fatal.
    async fn ping(&self) -> Result<()>;

    /// Periodic storage hygiene. Failures are logged by the caller and ignored.
    async fn maintenance(&self) -> Result<()> {
        Ok(())
    }

    // ---- settings ----

    /// Settings of every user with `is_bot_active = true`, ordered by user id.
    async fn active_settings(&self) -> Result<Vec<UserSettings>>;

    async fn settings(&self, user_id: i64) -> Result<Option<UserSettings>>;

    /// Zeroes both accumulators and moves `reset_date` to `next_reset_date`,
    /// only if `reset_date` still equals `expected_reset_date`. Returns whether
    /// the row was updated.
    async fn apply_daily_reset(
        &self,
        user_id: i64,
        expected_reset_date: NaiveDate,
        next_reset_date: NaiveDate,
    ) -> Result<bool>;

    /// Sets `is_bot_active = false`.
    async fn disable_bot(&self, user_id: i64) -> Result<()>;

    // ---- signals ----

    /// Up to `limit` signals with `processed_at` unset, oldest `created_at` first.
    async fn unprocessed_signals(&self, limit: usize) -> Result<Vec<Signal>>;

    async fn count_unprocessed_signals(&self) -> Result<u64>;

    /// Sets `processed_at` if it is still unset. Returns false if another
    /// worker got there first.
    async fn mark_signal_processed(&self, signal_id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Deletes signals created before `cutoff`, processed or not.
    async fn delete_signals_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // ---- trades ----

    /// True if the user has a `pending` or `open` trade.
    async fn has_live_trade(&self, user_id: i64) -> Result<bool>;

    /// Reserves a trade row in `pending` status.
    async fn insert_pending_trade(&self, trade: &NewTrade) -> Result<Trade>;

    /// Moves a `pending` trade to `open` with the broker's order id.
    async fn mark_trade_open(&self, trade_id: i64, order_id: &str) -> Result<()>;

    /// Removes a `pending` reservation whose order never reached the broker.
    async fn discard_pending_trade(&self, trade_id: i64) -> Result<()>;

    /// Trades in the given status, oldest `opened_at` first.
    async fn trades_with_status(&self, status: TradeStatus) -> Result<Vec<Trade>>;

    /// The user's most recent `won`/`lost` trades, newest first.
    async fn recent_closed_trades(&self, user_id: i64, limit: usize) -> Result<Vec<Trade>>;

    /// Atomically closes an `open` trade and adds its P&L to the owner's
    /// accumulators.
    ///
    /// Returns the owner's settings after the increment, or `None` if the
    /// trade was no longer `open` (already settled elsewhere), in which case
    /// nothing is written.
    async fn settle_trade(&self, settlement: &Settlement) -> Result<Option<UserSettings>>;

    /// Forces a live trade to `error` with zero P&L. Returns false if it had
    /// already reached a terminal status.
    async fn fail_trade(&self, trade_id: i64, at: DateTime<Utc>) -> Result<bool>;

    // ---- sessions ----

    /// Renews the user's newest non-closed session (reviving a stale one) or
    /// opens a new active session.
    async fn touch_session(&self, user_id: i64, at: DateTime<Utc>) -> Result<TradingSession>;

    async fn sessions_with_status(&self, statuses: &[SessionStatus]) -> Result<Vec<TradingSession>>;

    async fn set_session_status(&self, session_id: i64, status: SessionStatus) -> Result<()>;

    /// Closes every non-closed session of a user. Returns how many changed.
    async fn close_sessions_for_user(&self, user_id: i64) -> Result<u64>;
}

/// Broker capability consumed by the jobs.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Places one contract and returns the broker's acknowledgement.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;

    /// Current settlement state of a previously placed contract.
    async fn contract_status(&self, order_id: &str) -> Result<ContractStatus, BrokerError>;

    /// Reachability probe used by the health check.
    async fn ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn name(&self) -> &str;
}
