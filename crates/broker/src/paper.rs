//! Paper broker.
//!
//! Simulates binary contracts without touching a live account. The outcome is
//! drawn when the order is placed and revealed once the contract duration has
//! elapsed. Settled contracts are forgotten after a retention window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{debug, info};

use vtm_core::{
    BrokerError, BrokerGateway, ContractStatus, OrderAck, OrderRequest, PaperBrokerConfig,
};

#[derive(Debug, Clone)]
struct PaperContract {
    stake: Decimal,
    settles_at: DateTime<Utc>,
    won: bool,
}

pub struct PaperBroker {
    config: PaperBrokerConfig,
    retention: Duration,
    contracts: Mutex<HashMap<String, PaperContract>>,
    rng: Mutex<StdRng>,
    sequence: AtomicU64,
}

impl PaperBroker {
    #[must_use]
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic outcomes for a given seed.
    #[must_use]
    pub fn seeded(config: PaperBrokerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PaperBrokerConfig, rng: StdRng) -> Self {
        Self {
            config,
            retention: Duration::hours(24),
            contracts: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            sequence: AtomicU64::new(0),
        }
    }

    /// How long a settled contract stays queryable. Defaults to 24 hours.
    #[must_use]
    pub fn with_retention(mut self, retention: std::time::Duration) -> Self {
        self.retention = Duration::from_std(retention).unwrap_or(Duration::MAX);
        self
    }

    /// Number of contracts placed and not yet forgotten.
    #[must_use]
    pub fn contract_count(&self) -> usize {
        self.contracts.lock().len()
    }

    /// Places a contract as if the current time were `now`.
    ///
    /// # Errors
    /// Returns [`BrokerError::Rejected`] for a non-positive stake.
    pub fn place_order_at(
        &self,
        order: &OrderRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderAck, BrokerError> {
        if order.stake <= Decimal::ZERO {
            return Err(BrokerError::Rejected(format!(
                "stake must be positive, got {}",
                order.stake
            )));
        }

        let probability = self.config.win_probability.clamp(0.0, 1.0);
        let won = self.rng.lock().gen_bool(probability);
        let duration_secs = i64::try_from(self.config.contract_duration_secs).unwrap_or(i64::MAX);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let order_id = format!("PAPER-{}-{seq}", now.timestamp_millis());

        let mut contracts = self.contracts.lock();
        let before = contracts.len();
        contracts.retain(|_, c| now - c.settles_at <= self.retention);
        let forgotten = before - contracts.len();
        if forgotten > 0 {
            debug!(forgotten, "Paper contracts past retention dropped");
        }
        contracts.insert(
            order_id.clone(),
            PaperContract {
                stake: order.stake,
                settles_at: now + Duration::seconds(duration_secs),
                won,
            },
        );
        drop(contracts);

        info!(
            order_id,
            user_id = order.user_id,
            asset = order.asset,
            direction = %order.direction,
            stake = %order.stake,
            "Paper contract placed"
        );

        Ok(OrderAck {
            order_id,
            accepted_at: now,
        })
    }

    /// Contract state as of `now`.
    ///
    /// # Errors
    /// Returns [`BrokerError::UnknownContract`] for an id this broker never issued.
    pub fn contract_status_at(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ContractStatus, BrokerError> {
        let contracts = self.contracts.lock();
        let contract = contracts
            .get(order_id)
            .ok_or_else(|| BrokerError::unknown_contract(order_id))?;

        if now < contract.settles_at {
            return Ok(ContractStatus::Pending);
        }
        if contract.won {
            Ok(ContractStatus::Won {
                payout: (contract.stake * self.config.payout_multiplier).round_dp(2),
            })
        } else {
            Ok(ContractStatus::Lost {
                payout: Decimal::ZERO,
            })
        }
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        self.place_order_at(order, Utc::now())
    }

    async fn contract_status(&self, order_id: &str) -> Result<ContractStatus, BrokerError> {
        self.contract_status_at(order_id, Utc::now())
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use vtm_core::Direction;

    fn config(win_probability: f64) -> PaperBrokerConfig {
        PaperBrokerConfig {
            payout_multiplier: dec!(1.95),
            contract_duration_secs: 60,
            win_probability,
        }
    }

    fn order(stake: Decimal) -> OrderRequest {
        OrderRequest {
            user_id: 1,
            asset: "R_100".to_string(),
            stake,
            direction: Direction::Fall,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_contract_pending_until_duration_elapses() {
        let broker = PaperBroker::seeded(config(1.0), 7);
        let ack = broker.place_order_at(&order(dec!(2.00)), t0()).unwrap();

        let before = broker
            .contract_status_at(&ack.order_id, t0() + Duration::seconds(59))
            .unwrap();
        assert_eq!(before, ContractStatus::Pending);

        let after = broker
            .contract_status_at(&ack.order_id, t0() + Duration::seconds(60))
            .unwrap();
        assert_eq!(after, ContractStatus::Won { payout: dec!(3.90) });
    }

    #[test]
    fn test_losing_contract_pays_nothing() {
        let broker = PaperBroker::seeded(config(0.0), 7);
        let ack = broker.place_order_at(&order(dec!(1.00)), t0()).unwrap();
        let status = broker
            .contract_status_at(&ack.order_id, t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(status, ContractStatus::Lost { payout: dec!(0) });
    }

    #[test]
    fn test_order_ids_are_unique() {
        let broker = PaperBroker::seeded(config(0.5), 1);
        let a = broker.place_order_at(&order(dec!(1)), t0()).unwrap();
        let b = broker.place_order_at(&order(dec!(1)), t0()).unwrap();
        assert_ne!(a.order_id, b.order_id);
        assert_eq!(broker.contract_count(), 2);
    }

    #[test]
    fn test_settled_contracts_forgotten_after_retention() {
        let retention = std::time::Duration::from_secs(3600);
        let broker = PaperBroker::seeded(config(0.5), 1).with_retention(retention);
        let old = broker.place_order_at(&order(dec!(1)), t0()).unwrap();

        // Settled 59 minutes ago: still kept
        broker
            .place_order_at(&order(dec!(1)), t0() + Duration::minutes(60))
            .unwrap();
        assert_eq!(broker.contract_count(), 2);

        // Settled over an hour ago: dropped on the next placement
        broker
            .place_order_at(&order(dec!(1)), t0() + Duration::minutes(62))
            .unwrap();
        assert_eq!(broker.contract_count(), 2);
        let err = broker
            .contract_status_at(&old.order_id, t0() + Duration::minutes(62))
            .unwrap_err();
        assert!(matches!(err, BrokerError::UnknownContract { .. }));
    }

    #[test]
    fn test_unknown_contract() {
        let broker = PaperBroker::seeded(config(0.5), 1);
        let err = broker.contract_status_at("PAPER-0-1", t0()).unwrap_err();
        assert!(matches!(err, BrokerError::UnknownContract { .. }));
    }

    #[test]
    fn test_non_positive_stake_rejected() {
        let broker = PaperBroker::seeded(config(0.5), 1);
        let err = broker.place_order_at(&order(dec!(0)), t0()).unwrap_err();
        assert!(matches!(err, BrokerError::Rejected(_)));
    }
}
