//! Contract monitor: settles open trades and feeds the daily accumulators.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vtm_core::{
    AppConfig, BrokerError, BrokerGateway, ContractStatus, Repository, Settlement, Trade,
    TradeOutcome, TradeStatus,
};

use crate::limits::{enforce_risk_limits, roll_daily};
use crate::trading::to_chrono;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub checked: usize,
    pub won: usize,
    pub lost: usize,
    pub still_open: usize,
    /// Forced to `error` after exceeding the maximum open duration.
    pub expired: usize,
    /// Settled by someone else between read and write.
    pub already_settled: usize,
    /// Users whose bot was disabled by a settlement in this run.
    pub limits_hit: usize,
    pub errors: usize,
}

enum TradeCheck {
    Settled { outcome: TradeOutcome, limit_hit: bool },
    AlreadySettled,
    StillOpen,
    Expired,
}

pub struct ContractMonitor {
    repo: Arc<dyn Repository>,
    broker: Arc<dyn BrokerGateway>,
    max_open_duration: Duration,
}

impl ContractMonitor {
    pub fn new(
        repo: Arc<dyn Repository>,
        broker: Arc<dyn BrokerGateway>,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            broker,
            max_open_duration: to_chrono(config.monitor.max_open_duration()),
        }
    }

    /// Polls every open trade once and settles those the broker has resolved.
    ///
    /// # Errors
    /// Returns an error if the live trades cannot be listed. Failures for a
    /// single trade are logged and retried next run.
    pub async fn process_contract_results(&self) -> Result<MonitorReport> {
        self.process_contract_results_at(Utc::now()).await
    }

    /// [`Self::process_contract_results`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the live trades cannot be listed.
    pub async fn process_contract_results_at(&self, now: DateTime<Utc>) -> Result<MonitorReport> {
        let mut report = MonitorReport::default();

        // Reservations whose order never got acknowledged.
        for trade in self.repo.trades_with_status(TradeStatus::Pending).await? {
            if trade.age(now) > self.max_open_duration {
                match self.expire(&trade, now).await {
                    Ok(true) => report.expired += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(trade_id = trade.id, error = %e, "Failed to expire reservation");
                        report.errors += 1;
                    }
                }
            }
        }

        for trade in self.repo.trades_with_status(TradeStatus::Open).await? {
            report.checked += 1;
            match self.check(&trade, now).await {
                Ok(TradeCheck::Settled { outcome, limit_hit }) => {
                    match outcome {
                        TradeOutcome::Won => report.won += 1,
                        TradeOutcome::Lost => report.lost += 1,
                    }
                    if limit_hit {
                        report.limits_hit += 1;
                    }
                }
                Ok(TradeCheck::AlreadySettled) => report.already_settled += 1,
                Ok(TradeCheck::StillOpen) => report.still_open += 1,
                Ok(TradeCheck::Expired) => report.expired += 1,
                Err(e) => {
                    error!(trade_id = trade.id, user_id = trade.user_id, error = %e, "Contract check failed");
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 || report.expired > 0 {
            debug!(?report, "Contract monitor complete");
        }
        Ok(report)
    }

    async fn check(&self, trade: &Trade, now: DateTime<Utc>) -> Result<TradeCheck> {
        let Some(order_id) = trade.order_id.as_deref() else {
            warn!(trade_id = trade.id, "Open trade has no order id");
            return self.expire_if_overdue(trade, now).await;
        };

        let (outcome, payout) = match self.broker.contract_status(order_id).await {
            Ok(ContractStatus::Won { payout }) => (TradeOutcome::Won, payout),
            Ok(ContractStatus::Lost { payout }) => (TradeOutcome::Lost, payout),
            Ok(ContractStatus::Pending) => return self.expire_if_overdue(trade, now).await,
            Err(e) => {
                log_status_error(trade, &e);
                return self.expire_if_overdue(trade, now).await;
            }
        };

        // Credit the P&L to today's accumulators, not yesterday's.
        if let Some(owner) = self.repo.settings(trade.user_id).await? {
            roll_daily(self.repo.as_ref(), owner, now).await?;
        }

        let settlement = Settlement {
            trade_id: trade.id,
            user_id: trade.user_id,
            outcome,
            pnl: realized_pnl(outcome, trade.stake, payout),
            closed_at: now,
        };

        let Some(settings) = self.repo.settle_trade(&settlement).await? else {
            debug!(trade_id = trade.id, "Trade settled elsewhere");
            return Ok(TradeCheck::AlreadySettled);
        };

        info!(
            trade_id = trade.id,
            user_id = trade.user_id,
            outcome = ?outcome,
            pnl = %settlement.pnl,
            daily_profit = %settings.daily_profit,
            daily_loss = %settings.daily_loss,
            "Trade settled"
        );

        // Only a still-active bot needs switching off.
        let limit_hit = settings.is_bot_active
            && enforce_risk_limits(self.repo.as_ref(), &settings)
                .await?
                .is_terminal();

        Ok(TradeCheck::Settled { outcome, limit_hit })
    }

    async fn expire_if_overdue(&self, trade: &Trade, now: DateTime<Utc>) -> Result<TradeCheck> {
        if trade.age(now) <= self.max_open_duration {
            return Ok(TradeCheck::StillOpen);
        }
        if self.expire(trade, now).await? {
            Ok(TradeCheck::Expired)
        } else {
            Ok(TradeCheck::AlreadySettled)
        }
    }

    async fn expire(&self, trade: &Trade, now: DateTime<Utc>) -> Result<bool> {
        let failed = self.repo.fail_trade(trade.id, now).await?;
        if failed {
            warn!(
                trade_id = trade.id,
                user_id = trade.user_id,
                status = %trade.status,
                age_secs = trade.age(now).num_seconds(),
                "Trade exceeded maximum open duration, marked error"
            );
        }
        Ok(failed)
    }
}

/// Realized P&L of a settled contract: what came back minus what was staked.
///
/// A lost contract with no payout reported loses exactly its stake.
#[must_use]
pub fn realized_pnl(outcome: TradeOutcome, stake: Decimal, payout: Decimal) -> Decimal {
    match outcome {
        TradeOutcome::Won => payout - stake,
        TradeOutcome::Lost => (payout - stake).min(Decimal::ZERO),
    }
}

fn log_status_error(trade: &Trade, e: &BrokerError) {
    if e.is_transient() {
        debug!(trade_id = trade.id, error = %e, "Contract status unavailable, will retry");
    } else {
        warn!(trade_id = trade.id, error = %e, "Contract status query rejected");
    }
}
