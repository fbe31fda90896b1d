//! Per-user risk state machine and daily accumulator rollover.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::UserSettings;

/// Risk classification gating order placement.
///
/// `Running` is the only state that may place orders. Both other states are
/// terminal for the day: reaching one disables the bot, and re-activation must
/// zero the accumulators before the user is `Running` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    Running,
    TargetReached,
    StopLossReached,
}

impl RiskState {
    /// Classifies a user's settings.
    ///
    /// A threshold that is zero or negative is treated as unset.
    #[must_use]
    pub fn evaluate(settings: &UserSettings) -> Self {
        if settings.target > Decimal::ZERO && settings.daily_profit >= settings.target {
            return Self::TargetReached;
        }
        if settings.stop_limit > Decimal::ZERO && settings.daily_loss >= settings.stop_limit {
            return Self::StopLossReached;
        }
        Self::Running
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::TargetReached => "TARGET_REACHED",
            Self::StopLossReached => "STOP_LOSS_REACHED",
        }
    }
}

impl std::fmt::Display for RiskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the next `reset_date` if the accumulators are due to roll over on `today`.
///
/// The new date is one day after `today`, which for an on-time reset is exactly
/// one day after the old `reset_date`. A reset that was missed for several days
/// lands on tomorrow instead of replaying each missed day.
#[must_use]
pub fn daily_reset_due(settings: &UserSettings, today: NaiveDate) -> Option<NaiveDate> {
    if today < settings.reset_date {
        return None;
    }
    let base = settings.reset_date.max(today);
    base.checked_add_days(Days::new(1))
}

/// Zeroes the accumulators in place if a rollover is due. Returns whether it ran.
pub fn apply_daily_reset(settings: &mut UserSettings, today: NaiveDate) -> bool {
    match daily_reset_due(settings, today) {
        Some(next) => {
            settings.daily_profit = Decimal::ZERO;
            settings.daily_loss = Decimal::ZERO;
            settings.reset_date = next;
            true
        }
        None => false,
    }
}
