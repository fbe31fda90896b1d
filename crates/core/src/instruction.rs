//! Translation of raw signal payloads into trade instructions.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::SignalError;
use crate::models::Direction;

/// Who a signal is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionTarget {
    /// Every user with an active bot.
    AllActive,
    User(i64),
}

/// A validated request to open one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeInstruction {
    pub target: InstructionTarget,
    pub asset: String,
    pub direction: Direction,
    /// Replaces the money-management stake for this order only.
    pub stake: Option<Decimal>,
}

impl TradeInstruction {
    /// Parses a signal payload.
    ///
    /// Expected shape:
    /// `{"asset": "R_100", "direction": "CALL", "user_id": 12, "stake": "2.50"}`
    /// where `user_id` and `stake` are optional. Numbers may be JSON numbers or
    /// numeric strings.
    ///
    /// # Errors
    /// Returns a [`SignalError`] describing the first invalid field.
    pub fn from_payload(payload: &JsonValue) -> Result<Self, SignalError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| SignalError::Malformed(format!("expected object, got {payload}")))?;

        let asset = obj
            .get("asset")
            .or_else(|| obj.get("symbol"))
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignalError::MissingField("asset"))?
            .to_string();

        let raw_direction = obj
            .get("direction")
            .or_else(|| obj.get("contract_type"))
            .and_then(JsonValue::as_str)
            .ok_or(SignalError::MissingField("direction"))?;
        let direction = Direction::parse(raw_direction)
            .ok_or_else(|| SignalError::InvalidDirection(raw_direction.to_string()))?;

        let target = match obj.get("user_id") {
            None | Some(JsonValue::Null) => InstructionTarget::AllActive,
            Some(v) => InstructionTarget::User(parse_user_id(v)?),
        };

        let stake = match obj.get("stake") {
            None | Some(JsonValue::Null) => None,
            Some(v) => Some(parse_stake(v)?),
        };

        Ok(Self {
            target,
            asset,
            direction,
            stake,
        })
    }
}

fn parse_user_id(value: &JsonValue) -> Result<i64, SignalError> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| SignalError::InvalidUser(n.to_string())),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| SignalError::InvalidUser(s.clone())),
        other => Err(SignalError::InvalidUser(other.to_string())),
    }
}

fn parse_stake(value: &JsonValue) -> Result<Decimal, SignalError> {
    let text = match value {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.trim().to_string(),
        other => return Err(SignalError::InvalidStake(other.to_string())),
    };
    let stake = Decimal::from_str(&text).map_err(|_| SignalError::InvalidStake(text.clone()))?;
    if stake <= Decimal::ZERO {
        return Err(SignalError::InvalidStake(text));
    }
    Ok(stake)
}
