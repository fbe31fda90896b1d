//! Persisted entities shared by every job.
//!
//! All of these are owned by the storage layer. The jobs re-read them every
//! cycle and never keep authoritative copies between cycles.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Per-user risk thresholds and daily accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    /// Base stake per order, before money management.
    pub stake: Decimal,
    /// Daily profit that ends the trading day.
    pub target: Decimal,
    /// Daily loss that ends the trading day.
    pub stop_limit: Decimal,
    pub is_bot_active: bool,
    pub daily_profit: Decimal,
    /// Stored as a positive magnitude.
    pub daily_loss: Decimal,
    /// Date on which the accumulators next roll over.
    pub reset_date: NaiveDate,
}

impl UserSettings {
    /// Adds a realized P&L to the matching accumulator.
    ///
    /// Gains go to `daily_profit`, losses to `daily_loss` as a magnitude.
    pub fn record_pnl(&mut self, pnl: Decimal) {
        if pnl > Decimal::ZERO {
            self.daily_profit += pnl;
        } else if pnl < Decimal::ZERO {
            self.daily_loss += -pnl;
        }
    }
}

/// A raw trading signal awaiting translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
    /// Set once, never cleared.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Contract direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Price finishes above entry (broker contract type `CALL`).
    Rise,
    /// Price finishes below entry (broker contract type `PUT`).
    Fall,
}

impl Direction {
    /// Returns the string stored in the `trades.direction` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rise => "CALL",
            Self::Fall => "PUT",
        }
    }

    /// Parses the common spellings used by signal providers.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CALL" | "RISE" | "BUY" | "UP" | "HIGHER" => Some(Self::Rise),
            "PUT" | "FALL" | "SELL" | "DOWN" | "LOWER" => Some(Self::Fall),
            _ => None,
        }
    }

    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Rise => Self::Fall,
            Self::Fall => Self::Rise,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a trade.
///
/// `Pending -> Open -> {Won | Lost}`, or `Error` on timeout. Terminal
/// statuses never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Open,
    Won,
    Lost,
    Error,
}

impl TradeStatus {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Error => "error",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "open" => Some(Self::Open),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// True for statuses that occupy the user's single open-trade slot.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Open)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broker order placed on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub user_id: i64,
    pub signal_id: Option<i64>,
    /// Broker contract id, known once the gateway acknowledges.
    pub order_id: Option<String>,
    pub asset: String,
    pub stake: Decimal,
    pub direction: Direction,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Realized P&L, zero until settled.
    pub pnl: Decimal,
}

impl Trade {
    /// How long the trade has been live at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.opened_at
    }
}

/// Fields needed to reserve a new trade row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrade {
    pub user_id: i64,
    pub signal_id: Option<i64>,
    pub asset: String,
    pub stake: Decimal,
    pub direction: Direction,
    pub opened_at: DateTime<Utc>,
}

/// Settlement outcome reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Won,
    Lost,
}

impl TradeOutcome {
    #[must_use]
    pub fn status(&self) -> TradeStatus {
        match self {
            Self::Won => TradeStatus::Won,
            Self::Lost => TradeStatus::Lost,
        }
    }
}

/// A resolved contract ready to be written back atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub trade_id: i64,
    pub user_id: i64,
    pub outcome: TradeOutcome,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// Liveness of one bot runtime for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Stale,
    Closed,
}

impl SessionStatus {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Closed => "closed",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "stale" => Some(Self::Stale),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingSession {
    pub id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: SessionStatus,
}

impl TradingSession {
    #[must_use]
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_heartbeat
    }
}

/// Order submitted to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: i64,
    pub asset: String,
    pub stake: Decimal,
    pub direction: Direction,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Contract state as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    /// Not yet settled.
    Pending,
    Won { payout: Decimal },
    Lost { payout: Decimal },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn settings() -> UserSettings {
        UserSettings {
            user_id: 1,
            stake: dec!(1.00),
            target: dec!(100.00),
            stop_limit: dec!(50.00),
            is_bot_active: true,
            daily_profit: dec!(0),
            daily_loss: dec!(0),
            reset_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        }
    }

    #[test]
    fn test_record_pnl_routes_gains_and_losses() {
        let mut s = settings();
        s.record_pnl(dec!(0.95));
        s.record_pnl(dec!(-1.00));
        s.record_pnl(dec!(0));
        assert_eq!(s.daily_profit, dec!(0.95));
        assert_eq!(s.daily_loss, dec!(1.00));
    }

    #[test]
    fn test_direction_parses_provider_spellings() {
        assert_eq!(Direction::parse("call"), Some(Direction::Rise));
        assert_eq!(Direction::parse(" Buy "), Some(Direction::Rise));
        assert_eq!(Direction::parse("PUT"), Some(Direction::Fall));
        assert_eq!(Direction::parse("down"), Some(Direction::Fall));
        assert_eq!(Direction::parse("sideways"), None);
        assert_eq!(Direction::Rise.opposite(), Direction::Fall);
    }

    #[test]
    fn test_trade_status_round_trips_and_classifies() {
        for status in [
            TradeStatus::Pending,
            TradeStatus::Open,
            TradeStatus::Won,
            TradeStatus::Lost,
            TradeStatus::Error,
        ] {
            assert_eq!(TradeStatus::parse(status.as_str()), Some(status));
        }
        assert!(TradeStatus::Pending.is_live());
        assert!(TradeStatus::Open.is_live());
        assert!(TradeStatus::Won.is_terminal());
        assert!(TradeStatus::Error.is_terminal());
    }

    #[test]
    fn test_session_status_parses() {
        assert_eq!(SessionStatus::parse("STALE"), Some(SessionStatus::Stale));
        assert_eq!(SessionStatus::parse("gone"), None);
    }
}
