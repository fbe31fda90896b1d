use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use vtm_core::{apply_daily_reset, daily_reset_due, Repository, RiskState, UserSettings};

/// Applies the daily rollover if due. Returns the settings to evaluate and
/// whether this call reset them, or `None` if the user vanished meanwhile.
///
/// Every path that reads or credits the accumulators goes through here first.
pub(crate) async fn roll_daily(
    repo: &dyn Repository,
    settings: UserSettings,
    now: DateTime<Utc>,
) -> Result<Option<(UserSettings, bool)>> {
    let Some(next) = daily_reset_due(&settings, now.date_naive()) else {
        return Ok(Some((settings, false)));
    };

    if repo
        .apply_daily_reset(settings.user_id, settings.reset_date, next)
        .await?
    {
        info!(
            user_id = settings.user_id,
            previous_profit = %settings.daily_profit,
            previous_loss = %settings.daily_loss,
            next_reset = %next,
            "Daily accumulators reset"
        );
        let mut rolled = settings;
        apply_daily_reset(&mut rolled, now.date_naive());
        return Ok(Some((rolled, true)));
    }

    // Someone else moved reset_date first; use what is stored now.
    Ok(repo
        .settings(settings.user_id)
        .await?
        .map(|fresh| (fresh, false)))
}

/// Evaluates the user's risk state and, if a daily limit has been hit,
/// disables the bot and closes its sessions.
///
/// Safe to repeat: both writes are idempotent.
pub(crate) async fn enforce_risk_limits(
    repo: &dyn Repository,
    settings: &UserSettings,
) -> Result<RiskState> {
    let state = RiskState::evaluate(settings);
    if !state.is_terminal() {
        return Ok(state);
    }

    repo.disable_bot(settings.user_id).await?;
    let closed = repo.close_sessions_for_user(settings.user_id).await?;

    match state {
        RiskState::TargetReached => info!(
            user_id = settings.user_id,
            daily_profit = %settings.daily_profit,
            target = %settings.target,
            sessions_closed = closed,
            "Daily target reached, bot disabled"
        ),
        _ => warn!(
            user_id = settings.user_id,
            daily_loss = %settings.daily_loss,
            stop_limit = %settings.stop_limit,
            sessions_closed = closed,
            "Stop loss reached, bot disabled"
        ),
    }

    Ok(state)
}
