//! Autonomous entry rules for the trading loop.
//!
//! Signal-driven orders bypass these rules entirely; they only decide whether
//! the periodic loop opens a trade on its own for an idle, running user.

use crate::config::{EntryRuleKind, TradingConfig};
use crate::models::{Direction, Trade, UserSettings};

/// What the loop should trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub asset: String,
    pub direction: Direction,
}

pub trait EntryRule: Send + Sync {
    /// Next autonomous entry for a user with no live trade, if any.
    fn next_entry(&self, settings: &UserSettings, last_closed: Option<&Trade>) -> Option<Entry>;

    fn name(&self) -> &str;
}

/// Never trades autonomously.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalsOnly;

impl EntryRule for SignalsOnly {
    fn next_entry(&self, _settings: &UserSettings, _last_closed: Option<&Trade>) -> Option<Entry> {
        None
    }

    fn name(&self) -> &str {
        "signals_only"
    }
}

/// Trades one asset, flipping direction relative to the last closed trade.
#[derive(Debug, Clone)]
pub struct Alternate {
    pub asset: String,
}

impl EntryRule for Alternate {
    fn next_entry(&self, _settings: &UserSettings, last_closed: Option<&Trade>) -> Option<Entry> {
        let direction = last_closed.map_or(Direction::Rise, |t| t.direction.opposite());
        Some(Entry {
            asset: self.asset.clone(),
            direction,
        })
    }

    fn name(&self) -> &str {
        "alternate"
    }
}

#[must_use]
pub fn entry_rule_from_config(config: &TradingConfig) -> Box<dyn EntryRule> {
    match config.entry_rule {
        EntryRuleKind::SignalsOnly => Box::new(SignalsOnly),
        EntryRuleKind::Alternate => Box::new(Alternate {
            asset: config.default_asset.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn settings() -> UserSettings {
        UserSettings {
            user_id: 3,
            stake: dec!(1),
            target: dec!(10),
            stop_limit: dec!(10),
            is_bot_active: true,
            daily_profit: dec!(0),
            daily_loss: dec!(0),
            reset_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        }
    }

    #[test]
    fn test_signals_only_never_enters() {
        assert!(SignalsOnly.next_entry(&settings(), None).is_none());
    }

    #[test]
    fn test_alternate_flips_last_direction() {
        let rule = Alternate {
            asset: "R_50".to_string(),
        };
        let first = rule.next_entry(&settings(), None).unwrap();
        assert_eq!(first.direction, Direction::Rise);
        assert_eq!(first.asset, "R_50");

        let last = Trade {
            id: 9,
            user_id: 3,
            signal_id: None,
            order_id: None,
            asset: "R_50".to_string(),
            stake: dec!(1),
            direction: Direction::Rise,
            status: TradeStatus::Won,
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
            pnl: dec!(0.95),
        };
        let next = rule.next_entry(&settings(), Some(&last)).unwrap();
        assert_eq!(next.direction, Direction::Fall);
    }
}
