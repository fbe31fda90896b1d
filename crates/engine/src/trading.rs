//! Trading engine: per-user risk gating, order placement, session liveness.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vtm_core::{
    entry_rule_from_config, stake_rule_from_config, AppConfig, BrokerGateway, Direction,
    EntryRule, InstructionTarget, NewTrade, OrderRequest, Repository, RiskState, SessionStatus,
    StakeRule, Trade, TradeInstruction, TradeStatus, UserSettings,
};

use crate::health::HealthReport;
use crate::limits::{enforce_risk_limits, roll_daily};

/// Why a user was passed over for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    UnknownUser,
    BotInactive,
    RiskLimit(RiskState),
    LiveTradeExists,
}

/// Result of trying to place one order for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    Placed(Trade),
    Skipped(SkipReason),
    /// Broker or storage failure. Nothing was persisted; the user is eligible
    /// again on the next cycle.
    Failed(String),
}

/// One user's share of a trade instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub user_id: i64,
    pub outcome: PlacementOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradingLoopReport {
    pub users: usize,
    pub resets: usize,
    pub halted: usize,
    pub busy: usize,
    pub idle: usize,
    pub placed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionCleanupReport {
    pub closed: usize,
    pub marked_stale: usize,
}

enum UserCycle {
    Halted,
    Busy,
    Idle,
    Placed,
    Failed,
}

pub struct TradingEngine {
    repo: Arc<dyn Repository>,
    broker: Arc<dyn BrokerGateway>,
    stake_rule: Box<dyn StakeRule>,
    entry_rule: Box<dyn EntryRule>,
    stale_after: Duration,
    max_open_duration: Duration,
}

impl TradingEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        broker: Arc<dyn BrokerGateway>,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            broker,
            stake_rule: stake_rule_from_config(&config.trading.money_management),
            entry_rule: entry_rule_from_config(&config.trading),
            stale_after: to_chrono(config.stale_session_threshold()),
            max_open_duration: to_chrono(config.monitor.max_open_duration()),
        }
    }

    #[must_use]
    pub fn with_stake_rule(mut self, rule: Box<dyn StakeRule>) -> Self {
        self.stake_rule = rule;
        self
    }

    #[must_use]
    pub fn with_entry_rule(mut self, rule: Box<dyn EntryRule>) -> Self {
        self.entry_rule = rule;
        self
    }

    // ========================================================================
    // Trading loop
    // ========================================================================

    /// Runs one pass over every active user.
    ///
    /// # Errors
    /// Returns an error only if the active users cannot be listed. Failures for
    /// a single user are logged and counted.
    pub async fn process_trading_loop(&self) -> Result<TradingLoopReport> {
        self.process_trading_loop_at(Utc::now()).await
    }

    /// [`Self::process_trading_loop`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error only if the active users cannot be listed.
    pub async fn process_trading_loop_at(&self, now: DateTime<Utc>) -> Result<TradingLoopReport> {
        let users = self.repo.active_settings().await?;
        let mut report = TradingLoopReport {
            users: users.len(),
            ..TradingLoopReport::default()
        };

        for settings in users {
            let user_id = settings.user_id;
            let (settings, was_reset) = match roll_daily(self.repo.as_ref(), settings, now).await {
                Ok(Some(rolled)) => rolled,
                Ok(None) => continue,
                Err(e) => {
                    error!(user_id, error = %e, "Daily reset failed");
                    report.failed += 1;
                    continue;
                }
            };
            if was_reset {
                report.resets += 1;
            }

            match self.run_user(&settings, now).await {
                Ok(UserCycle::Halted) => report.halted += 1,
                Ok(UserCycle::Busy) => report.busy += 1,
                Ok(UserCycle::Idle) => report.idle += 1,
                Ok(UserCycle::Placed) => report.placed += 1,
                Ok(UserCycle::Failed) => report.failed += 1,
                Err(e) => {
                    error!(user_id, error = %e, "Trading loop failed for user");
                    report.failed += 1;
                }
            }
        }

        debug!(?report, "Trading loop complete");
        Ok(report)
    }

    async fn run_user(&self, settings: &UserSettings, now: DateTime<Utc>) -> Result<UserCycle> {
        if enforce_risk_limits(self.repo.as_ref(), settings)
            .await?
            .is_terminal()
        {
            return Ok(UserCycle::Halted);
        }

        self.repo.touch_session(settings.user_id, now).await?;

        if self.repo.has_live_trade(settings.user_id).await? {
            return Ok(UserCycle::Busy);
        }

        let recent = self.recent_closed(settings.user_id).await?;
        let Some(entry) = self.entry_rule.next_entry(settings, recent.first()) else {
            return Ok(UserCycle::Idle);
        };

        let stake = self.stake_rule.next_stake(settings.stake, &recent);
        match self
            .place(settings.user_id, None, &entry.asset, entry.direction, stake, now)
            .await?
        {
            PlacementOutcome::Placed(_) => Ok(UserCycle::Placed),
            PlacementOutcome::Skipped(_) => Ok(UserCycle::Busy),
            PlacementOutcome::Failed(_) => Ok(UserCycle::Failed),
        }
    }

    async fn recent_closed(&self, user_id: i64) -> Result<Vec<Trade>> {
        let depth = self.stake_rule.history_depth().max(1);
        self.repo.recent_closed_trades(user_id, depth).await
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Places a signal-driven instruction for every user it targets.
    ///
    /// # Errors
    /// Returns an error only if the target users cannot be resolved. Per-user
    /// failures are reported in the returned placements.
    pub async fn place_instruction(
        &self,
        instruction: &TradeInstruction,
        signal_id: Option<i64>,
    ) -> Result<Vec<Placement>> {
        self.place_instruction_at(instruction, signal_id, Utc::now())
            .await
    }

    /// [`Self::place_instruction`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error only if the target users cannot be resolved.
    pub async fn place_instruction_at(
        &self,
        instruction: &TradeInstruction,
        signal_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Placement>> {
        let user_ids: Vec<i64> = match instruction.target {
            InstructionTarget::User(id) => vec![id],
            InstructionTarget::AllActive => self
                .repo
                .active_settings()
                .await?
                .iter()
                .map(|s| s.user_id)
                .collect(),
        };

        let mut placements = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let outcome = match self
                .place_for_user(user_id, instruction, signal_id, now)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(user_id, signal_id, error = %e, "Placement failed");
                    PlacementOutcome::Failed(format!("{e:#}"))
                }
            };
            placements.push(Placement { user_id, outcome });
        }
        Ok(placements)
    }

    async fn place_for_user(
        &self,
        user_id: i64,
        instruction: &TradeInstruction,
        signal_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<PlacementOutcome> {
        let Some(settings) = self.repo.settings(user_id).await? else {
            return Ok(PlacementOutcome::Skipped(SkipReason::UnknownUser));
        };
        if !settings.is_bot_active {
            return Ok(PlacementOutcome::Skipped(SkipReason::BotInactive));
        }

        let Some((settings, _)) = roll_daily(self.repo.as_ref(), settings, now).await? else {
            return Ok(PlacementOutcome::Skipped(SkipReason::UnknownUser));
        };

        let state = enforce_risk_limits(self.repo.as_ref(), &settings).await?;
        if state.is_terminal() {
            return Ok(PlacementOutcome::Skipped(SkipReason::RiskLimit(state)));
        }
        if self.repo.has_live_trade(user_id).await? {
            return Ok(PlacementOutcome::Skipped(SkipReason::LiveTradeExists));
        }

        let stake = match instruction.stake {
            Some(stake) => stake,
            None => {
                let recent = self.recent_closed(user_id).await?;
                self.stake_rule.next_stake(settings.stake, &recent)
            }
        };

        self.place(
            user_id,
            signal_id,
            &instruction.asset,
            instruction.direction,
            stake,
            now,
        )
        .await
    }

    /// Reserves the user's live-trade slot, submits the order, and opens the
    /// trade on acknowledgement. A refused order leaves no trade behind.
    async fn place(
        &self,
        user_id: i64,
        signal_id: Option<i64>,
        asset: &str,
        direction: Direction,
        stake: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PlacementOutcome> {
        let pending = self
            .repo
            .insert_pending_trade(&NewTrade {
                user_id,
                signal_id,
                asset: asset.to_string(),
                stake,
                direction,
                opened_at: now,
            })
            .await?;

        let order = OrderRequest {
            user_id,
            asset: asset.to_string(),
            stake,
            direction,
        };

        let ack = match self.broker.place_order(&order).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    user_id,
                    asset,
                    transient = e.is_transient(),
                    error = %e,
                    "Order not placed"
                );
                if let Err(discard) = self.repo.discard_pending_trade(pending.id).await {
                    error!(
                        trade_id = pending.id,
                        error = %discard,
                        "Failed to discard reservation, contract monitor will expire it"
                    );
                }
                return Ok(PlacementOutcome::Failed(e.to_string()));
            }
        };

        self.repo.mark_trade_open(pending.id, &ack.order_id).await?;

        info!(
            user_id,
            trade_id = pending.id,
            order_id = ack.order_id,
            asset,
            direction = %direction,
            stake = %stake,
            "Trade opened"
        );

        Ok(PlacementOutcome::Placed(Trade {
            order_id: Some(ack.order_id),
            status: TradeStatus::Open,
            ..pending
        }))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Closes sessions whose heartbeat is older than the stale threshold and
    /// flags those past half of it as stale.
    ///
    /// # Errors
    /// Returns an error if the sessions cannot be read or updated.
    pub async fn cleanup_stale_sessions(&self) -> Result<SessionCleanupReport> {
        self.cleanup_stale_sessions_at(Utc::now()).await
    }

    /// [`Self::cleanup_stale_sessions`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the sessions cannot be read or updated.
    pub async fn cleanup_stale_sessions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SessionCleanupReport> {
        let sessions = self
            .repo
            .sessions_with_status(&[SessionStatus::Active, SessionStatus::Stale])
            .await?;
        let warn_after = self.stale_after / 2;
        let mut report = SessionCleanupReport::default();

        for session in sessions {
            let age = session.heartbeat_age(now);
            if age > self.stale_after {
                self.repo
                    .set_session_status(session.id, SessionStatus::Closed)
                    .await?;
                info!(
                    session_id = session.id,
                    user_id = session.user_id,
                    age_secs = age.num_seconds(),
                    "Stale session closed"
                );
                report.closed += 1;
            } else if age > warn_after && session.status == SessionStatus::Active {
                self.repo
                    .set_session_status(session.id, SessionStatus::Stale)
                    .await?;
                debug!(
                    session_id = session.id,
                    user_id = session.user_id,
                    "Session marked stale"
                );
                report.marked_stale += 1;
            }
        }

        Ok(report)
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Checks broker reachability, overdue trades, session liveness, and
    /// signal backlog. Never fails; problems are logged and reported.
    pub async fn perform_health_check(&self) -> HealthReport {
        self.perform_health_check_at(Utc::now()).await
    }

    /// [`Self::perform_health_check`] with an explicit clock.
    pub async fn perform_health_check_at(&self, now: DateTime<Utc>) -> HealthReport {
        let mut report = HealthReport {
            storage_reachable: true,
            ..HealthReport::default()
        };

        match self.broker.ping().await {
            Ok(()) => report.broker_reachable = true,
            Err(e) => warn!(broker = self.broker.name(), error = %e, "Broker unreachable"),
        }

        for status in [TradeStatus::Pending, TradeStatus::Open] {
            match self.repo.trades_with_status(status).await {
                Ok(trades) => {
                    for trade in trades.iter().filter(|t| t.age(now) > self.max_open_duration) {
                        warn!(
                            trade_id = trade.id,
                            user_id = trade.user_id,
                            status = %trade.status,
                            age_secs = trade.age(now).num_seconds(),
                            "Trade open past maximum duration"
                        );
                        report.overdue_trades += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Health check could not read trades");
                    report.storage_reachable = false;
                }
            }
        }

        match self
            .repo
            .sessions_with_status(&[SessionStatus::Active, SessionStatus::Stale])
            .await
        {
            Ok(sessions) => {
                let warn_after = self.stale_after / 2;
                report.stale_sessions = sessions
                    .iter()
                    .filter(|s| s.heartbeat_age(now) > warn_after)
                    .count();
                if report.stale_sessions > 0 {
                    warn!(count = report.stale_sessions, "Sessions without recent heartbeat");
                }
            }
            Err(e) => {
                warn!(error = %e, "Health check could not read sessions");
                report.storage_reachable = false;
            }
        }

        match self.repo.count_unprocessed_signals().await {
            Ok(count) => report.unprocessed_signals = count,
            Err(e) => {
                warn!(error = %e, "Health check could not count signals");
                report.storage_reachable = false;
            }
        }

        if report.is_healthy() {
            debug!(?report, "Health check passed");
        }
        report
    }
}

pub(crate) fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}
