//! In-process [`Repository`] used for paper runs and tests.
//!
//! Every trait call takes the state lock once, so multi-row operations are
//! atomic with respect to each other just like the PostgreSQL transactions.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use vtm_core::{
    NewTrade, Repository, SessionStatus, Settlement, Signal, Trade, TradeStatus, TradingSession,
    UserSettings,
};

#[derive(Debug, Default)]
struct State {
    settings: BTreeMap<i64, UserSettings>,
    signals: Vec<Signal>,
    trades: Vec<Trade>,
    sessions: Vec<TradingSession>,
    next_signal_id: i64,
    next_trade_id: i64,
    next_session_id: i64,
    maintenance_runs: u64,
    offline: bool,
}

impl State {
    fn trade_mut(&mut self, trade_id: i64) -> Option<&mut Trade> {
        self.trades.iter_mut().find(|t| t.id == trade_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.offline {
            anyhow::bail!("repository offline");
        }
        Ok(state)
    }

    /// Makes every subsequent call fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Inserts or replaces a user's settings.
    pub fn upsert_settings(&self, settings: UserSettings) {
        self.state.lock().settings.insert(settings.user_id, settings);
    }

    /// Enqueues a signal and returns its ID.
    pub fn push_signal(&self, payload: JsonValue, created_at: DateTime<Utc>) -> i64 {
        let mut state = self.state.lock();
        state.next_signal_id += 1;
        let id = state.next_signal_id;
        state.signals.push(Signal {
            id,
            payload,
            created_at,
            processed_at: None,
        });
        id
    }

    /// Stores a trade as given, replacing its ID with a fresh one.
    pub fn insert_trade(&self, mut trade: Trade) -> Trade {
        let mut state = self.state.lock();
        state.next_trade_id += 1;
        trade.id = state.next_trade_id;
        state.trades.push(trade.clone());
        trade
    }

    /// Stores a session with explicit timestamps.
    pub fn insert_session(
        &self,
        user_id: i64,
        started_at: DateTime<Utc>,
        last_heartbeat: DateTime<Utc>,
        status: SessionStatus,
    ) -> TradingSession {
        let mut state = self.state.lock();
        state.next_session_id += 1;
        let session = TradingSession {
            id: state.next_session_id,
            user_id,
            started_at,
            last_heartbeat,
            status,
        };
        state.sessions.push(session.clone());
        session
    }

    #[must_use]
    pub fn settings_snapshot(&self, user_id: i64) -> Option<UserSettings> {
        self.state.lock().settings.get(&user_id).cloned()
    }

    #[must_use]
    pub fn signals_snapshot(&self) -> Vec<Signal> {
        self.state.lock().signals.clone()
    }

    #[must_use]
    pub fn trades_snapshot(&self) -> Vec<Trade> {
        self.state.lock().trades.clone()
    }

    #[must_use]
    pub fn sessions_snapshot(&self) -> Vec<TradingSession> {
        self.state.lock().sessions.clone()
    }

    #[must_use]
    pub fn maintenance_runs(&self) -> u64 {
        self.state.lock().maintenance_runs
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> Result<()> {
        self.state().map(|_| ())
    }

    async fn maintenance(&self) -> Result<()> {
        self.state()?.maintenance_runs += 1;
        Ok(())
    }

    async fn active_settings(&self) -> Result<Vec<UserSettings>> {
        Ok(self
            .state()?
            .settings
            .values()
            .filter(|s| s.is_bot_active)
            .cloned()
            .collect())
    }

    async fn settings(&self, user_id: i64) -> Result<Option<UserSettings>> {
        Ok(self.state()?.settings.get(&user_id).cloned())
    }

    async fn apply_daily_reset(
        &self,
        user_id: i64,
        expected_reset_date: NaiveDate,
        next_reset_date: NaiveDate,
    ) -> Result<bool> {
        let mut state = self.state()?;
        match state.settings.get_mut(&user_id) {
            Some(s) if s.reset_date == expected_reset_date => {
                s.daily_profit = Decimal::ZERO;
                s.daily_loss = Decimal::ZERO;
                s.reset_date = next_reset_date;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn disable_bot(&self, user_id: i64) -> Result<()> {
        if let Some(s) = self.state()?.settings.get_mut(&user_id) {
            s.is_bot_active = false;
        }
        Ok(())
    }

    async fn unprocessed_signals(&self, limit: usize) -> Result<Vec<Signal>> {
        let state = self.state()?;
        let mut pending: Vec<Signal> = state
            .signals
            .iter()
            .filter(|s| s.processed_at.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|s| (s.created_at, s.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn count_unprocessed_signals(&self) -> Result<u64> {
        let state = self.state()?;
        Ok(state.signals.iter().filter(|s| s.processed_at.is_none()).count() as u64)
    }

    async fn mark_signal_processed(&self, signal_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        match state
            .signals
            .iter_mut()
            .find(|s| s.id == signal_id && s.processed_at.is_none())
        {
            Some(signal) => {
                signal.processed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_signals_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state()?;
        let before = state.signals.len();
        state.signals.retain(|s| s.created_at >= cutoff);
        let removed = before - state.signals.len();

        // Mirrors ON DELETE SET NULL on trades.signal_id.
        let remaining: Vec<i64> = state.signals.iter().map(|s| s.id).collect();
        for trade in &mut state.trades {
            if trade.signal_id.is_some_and(|id| !remaining.contains(&id)) {
                trade.signal_id = None;
            }
        }
        Ok(removed as u64)
    }

    async fn has_live_trade(&self, user_id: i64) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .trades
            .iter()
            .any(|t| t.user_id == user_id && t.status.is_live()))
    }

    async fn insert_pending_trade(&self, trade: &NewTrade) -> Result<Trade> {
        let mut state = self.state()?;
        if state
            .trades
            .iter()
            .any(|t| t.user_id == trade.user_id && t.status.is_live())
        {
            anyhow::bail!("User {} already holds a live trade", trade.user_id);
        }

        state.next_trade_id += 1;
        let stored = Trade {
            id: state.next_trade_id,
            user_id: trade.user_id,
            signal_id: trade.signal_id,
            order_id: None,
            asset: trade.asset.clone(),
            stake: trade.stake,
            direction: trade.direction,
            status: TradeStatus::Pending,
            opened_at: trade.opened_at,
            closed_at: None,
            pnl: Decimal::ZERO,
        };
        state.trades.push(stored.clone());
        Ok(stored)
    }

    async fn mark_trade_open(&self, trade_id: i64, order_id: &str) -> Result<()> {
        let mut state = self.state()?;
        match state.trade_mut(trade_id) {
            Some(t) if t.status == TradeStatus::Pending => {
                t.status = TradeStatus::Open;
                t.order_id = Some(order_id.to_string());
                Ok(())
            }
            _ => anyhow::bail!("Trade {trade_id} is no longer pending"),
        }
    }

    async fn discard_pending_trade(&self, trade_id: i64) -> Result<()> {
        self.state()?
            .trades
            .retain(|t| !(t.id == trade_id && t.status == TradeStatus::Pending));
        Ok(())
    }

    async fn trades_with_status(&self, status: TradeStatus) -> Result<Vec<Trade>> {
        let state = self.state()?;
        let mut trades: Vec<Trade> = state
            .trades
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        trades.sort_by_key(|t| (t.opened_at, t.id));
        Ok(trades)
    }

    async fn recent_closed_trades(&self, user_id: i64, limit: usize) -> Result<Vec<Trade>> {
        let state = self.state()?;
        let mut trades: Vec<Trade> = state
            .trades
            .iter()
            .filter(|t| {
                t.user_id == user_id && matches!(t.status, TradeStatus::Won | TradeStatus::Lost)
            })
            .cloned()
            .collect();
        trades.sort_by(|a, b| (b.closed_at, b.id).cmp(&(a.closed_at, a.id)));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn settle_trade(&self, settlement: &Settlement) -> Result<Option<UserSettings>> {
        let mut state = self.state()?;

        let is_open = state
            .trades
            .iter()
            .any(|t| t.id == settlement.trade_id && t.status == TradeStatus::Open);
        if !is_open {
            return Ok(None);
        }
        if !state.settings.contains_key(&settlement.user_id) {
            anyhow::bail!(
                "No settings for user {} while settling trade {}",
                settlement.user_id,
                settlement.trade_id
            );
        }

        if let Some(trade) = state.trade_mut(settlement.trade_id) {
            trade.status = settlement.outcome.status();
            trade.closed_at = Some(settlement.closed_at);
            trade.pnl = settlement.pnl;
        }
        let settings = state
            .settings
            .get_mut(&settlement.user_id)
            .map(|s| {
                s.record_pnl(settlement.pnl);
                s.clone()
            });
        Ok(settings)
    }

    async fn fail_trade(&self, trade_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        match state.trade_mut(trade_id) {
            Some(t) if t.status.is_live() => {
                t.status = TradeStatus::Error;
                t.closed_at = Some(at);
                t.pnl = Decimal::ZERO;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_session(&self, user_id: i64, at: DateTime<Utc>) -> Result<TradingSession> {
        let mut state = self.state()?;

        let newest = state
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.status != SessionStatus::Closed)
            .max_by_key(|s| (s.started_at, s.id));
        if let Some(session) = newest {
            session.last_heartbeat = at;
            session.status = SessionStatus::Active;
            return Ok(session.clone());
        }

        state.next_session_id += 1;
        let session = TradingSession {
            id: state.next_session_id,
            user_id,
            started_at: at,
            last_heartbeat: at,
            status: SessionStatus::Active,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn sessions_with_status(&self, statuses: &[SessionStatus]) -> Result<Vec<TradingSession>> {
        let state = self.state()?;
        let mut sessions: Vec<TradingSession> = state
            .sessions
            .iter()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.last_heartbeat, s.id));
        Ok(sessions)
    }

    async fn set_session_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        if let Some(s) = self
            .state()?
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
        {
            s.status = status;
        }
        Ok(())
    }

    async fn close_sessions_for_user(&self, user_id: i64) -> Result<u64> {
        let mut state = self.state()?;
        let mut closed = 0;
        for session in state
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.status != SessionStatus::Closed)
        {
            session.status = SessionStatus::Closed;
            closed += 1;
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use vtm_core::{Direction, TradeOutcome};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, minute, 0).unwrap()
    }

    fn settings(user_id: i64) -> UserSettings {
        UserSettings {
            user_id,
            stake: dec!(1.00),
            target: dec!(100.00),
            stop_limit: dec!(50.00),
            is_bot_active: true,
            daily_profit: dec!(0),
            daily_loss: dec!(0),
            reset_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        }
    }

    fn new_trade(user_id: i64) -> NewTrade {
        NewTrade {
            user_id,
            signal_id: None,
            asset: "R_100".to_string(),
            stake: dec!(1.00),
            direction: Direction::Rise,
            opened_at: at(0),
        }
    }

    #[tokio::test]
    async fn test_unprocessed_signals_are_fifo_and_bounded() {
        let repo = MemoryRepository::new();
        let late = repo.push_signal(json!({"n": 1}), at(5));
        let early = repo.push_signal(json!({"n": 2}), at(1));
        repo.push_signal(json!({"n": 3}), at(9));

        let batch = repo.unprocessed_signals(2).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![early, late]);
    }

    #[tokio::test]
    async fn test_mark_signal_processed_is_compare_and_set() {
        let repo = MemoryRepository::new();
        let id = repo.push_signal(json!({}), at(0));

        assert!(repo.mark_signal_processed(id, at(1)).await.unwrap());
        assert!(!repo.mark_signal_processed(id, at(2)).await.unwrap());
        assert_eq!(repo.signals_snapshot()[0].processed_at, Some(at(1)));
        assert_eq!(repo.count_unprocessed_signals().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_live_trade_rejected() {
        let repo = MemoryRepository::new();
        repo.upsert_settings(settings(1));

        repo.insert_pending_trade(&new_trade(1)).await.unwrap();
        assert!(repo.insert_pending_trade(&new_trade(1)).await.is_err());
        assert!(repo.insert_pending_trade(&new_trade(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_settle_only_once() {
        let repo = MemoryRepository::new();
        repo.upsert_settings(settings(1));
        let trade = repo.insert_pending_trade(&new_trade(1)).await.unwrap();
        repo.mark_trade_open(trade.id, "C-1").await.unwrap();

        let settlement = Settlement {
            trade_id: trade.id,
            user_id: 1,
            outcome: TradeOutcome::Lost,
            pnl: dec!(-1.00),
            closed_at: at(2),
        };
        let updated = repo.settle_trade(&settlement).await.unwrap().unwrap();
        assert_eq!(updated.daily_loss, dec!(1.00));

        assert!(repo.settle_trade(&settlement).await.unwrap().is_none());
        assert_eq!(repo.settings_snapshot(1).unwrap().daily_loss, dec!(1.00));
    }

    #[tokio::test]
    async fn test_settle_without_settings_writes_nothing() {
        let repo = MemoryRepository::new();
        let trade = repo.insert_pending_trade(&new_trade(7)).await.unwrap();
        repo.mark_trade_open(trade.id, "C-7").await.unwrap();

        let settlement = Settlement {
            trade_id: trade.id,
            user_id: 7,
            outcome: TradeOutcome::Won,
            pnl: dec!(0.95),
            closed_at: at(2),
        };
        assert!(repo.settle_trade(&settlement).await.is_err());
        assert_eq!(repo.trades_snapshot()[0].status, TradeStatus::Open);
    }

    #[tokio::test]
    async fn test_daily_reset_requires_expected_date() {
        let repo = MemoryRepository::new();
        let mut s = settings(1);
        s.daily_profit = dec!(5);
        repo.upsert_settings(s.clone());

        let stale = s.reset_date - Duration::days(1);
        assert!(!repo.apply_daily_reset(1, stale, s.reset_date).await.unwrap());

        let next = s.reset_date + Duration::days(1);
        assert!(repo.apply_daily_reset(1, s.reset_date, next).await.unwrap());
        let after = repo.settings_snapshot(1).unwrap();
        assert_eq!(after.daily_profit, dec!(0));
        assert_eq!(after.reset_date, next);
    }

    #[tokio::test]
    async fn test_touch_session_revives_stale() {
        let repo = MemoryRepository::new();
        let stale = repo.insert_session(1, at(0), at(0), SessionStatus::Stale);

        let touched = repo.touch_session(1, at(10)).await.unwrap();
        assert_eq!(touched.id, stale.id);
        assert_eq!(touched.status, SessionStatus::Active);
        assert_eq!(touched.last_heartbeat, at(10));

        assert_eq!(repo.close_sessions_for_user(1).await.unwrap(), 1);
        let fresh = repo.touch_session(1, at(20)).await.unwrap();
        assert_ne!(fresh.id, stale.id);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let repo = MemoryRepository::new();
        repo.set_offline(true);
        assert!(repo.ping().await.is_err());
        assert!(repo.active_settings().await.is_err());

        repo.set_offline(false);
        assert!(repo.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_old_signals_detaches_trades() {
        let repo = MemoryRepository::new();
        let old = repo.push_signal(json!({}), at(0));
        repo.push_signal(json!({}), at(30));
        let mut trade = new_trade(1);
        trade.signal_id = Some(old);
        repo.insert_pending_trade(&trade).await.unwrap();

        assert_eq!(repo.delete_signals_older_than(at(10)).await.unwrap(), 1);
        assert_eq!(repo.signals_snapshot().len(), 1);
        assert_eq!(repo.trades_snapshot()[0].signal_id, None);
    }
}
