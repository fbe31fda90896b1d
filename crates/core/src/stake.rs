use rust_decimal::Decimal;

use crate::config::{MoneyManagementConfig, MoneyManagementKind};
use crate::models::{Trade, TradeStatus};

/// Money-management rule sizing the next order.
pub trait StakeRule: Send + Sync {
    /// Stake for the next order.
    ///
    /// # Arguments
    /// * `base_stake` - The user's configured stake
    /// * `recent` - The user's most recent won/lost trades, newest first
    fn next_stake(&self, base_stake: Decimal, recent: &[Trade]) -> Decimal;

    /// How many recent closed trades `next_stake` needs to see.
    fn history_depth(&self) -> usize {
        0
    }

    fn name(&self) -> &str;
}

/// Always trades the base stake.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatStake;

impl StakeRule for FlatStake {
    fn next_stake(&self, base_stake: Decimal, _recent: &[Trade]) -> Decimal {
        base_stake
    }

    fn name(&self) -> &str {
        "flat"
    }
}

/// Recovery sizing: multiply the stake after each consecutive loss.
///
/// After `max_steps` escalations the progression gives up and falls back to the
/// base stake until the next win.
#[derive(Debug, Clone, Copy)]
pub struct Martingale {
    pub multiplier: Decimal,
    pub max_steps: u32,
}

impl Martingale {
    #[must_use]
    pub fn new(multiplier: Decimal, max_steps: u32) -> Self {
        Self {
            multiplier,
            max_steps,
        }
    }
}

impl StakeRule for Martingale {
    fn next_stake(&self, base_stake: Decimal, recent: &[Trade]) -> Decimal {
        let losing_streak = recent
            .iter()
            .take_while(|t| t.status == TradeStatus::Lost)
            .count();

        if losing_streak == 0 || losing_streak > self.max_steps as usize {
            return base_stake;
        }

        let mut stake = base_stake;
        for _ in 0..losing_streak {
            match stake.checked_mul(self.multiplier) {
                Some(next) => stake = next,
                None => return base_stake,
            }
        }
        stake.round_dp(2)
    }

    fn history_depth(&self) -> usize {
        self.max_steps as usize + 1
    }

    fn name(&self) -> &str {
        "martingale"
    }
}

/// Builds the configured stake rule.
#[must_use]
pub fn stake_rule_from_config(config: &MoneyManagementConfig) -> Box<dyn StakeRule> {
    match config.kind {
        MoneyManagementKind::Flat => Box::new(FlatStake),
        MoneyManagementKind::Martingale => {
            Box::new(Martingale::new(config.multiplier, config.max_steps))
        }
    }
}
