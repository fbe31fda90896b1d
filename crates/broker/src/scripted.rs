//! Broker whose answers are set by the caller.
//!
//! Used to drive the jobs through specific settlement and failure sequences.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use vtm_core::{BrokerError, BrokerGateway, ContractStatus, OrderAck, OrderRequest};

#[derive(Debug, Default)]
struct Script {
    placed: Vec<(String, OrderRequest)>,
    order_failures: VecDeque<BrokerError>,
    statuses: HashMap<String, Result<ContractStatus, BrokerError>>,
    status_queries: usize,
    unreachable: bool,
}

/// Accepts every order unless a failure is queued; reports `Pending` for every
/// contract until told otherwise.
#[derive(Debug, Default)]
pub struct ScriptedBroker {
    script: Mutex<Script>,
}

impl ScriptedBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next order is refused with `error`. Queued failures apply in order.
    pub fn fail_next_order(&self, error: BrokerError) {
        self.script.lock().order_failures.push_back(error);
    }

    /// Sets what `contract_status` answers for `order_id`.
    pub fn set_status(&self, order_id: &str, status: Result<ContractStatus, BrokerError>) {
        self.script
            .lock()
            .statuses
            .insert(order_id.to_string(), status);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.script.lock().unreachable = !reachable;
    }

    /// Orders accepted so far with their assigned ids.
    #[must_use]
    pub fn placed(&self) -> Vec<(String, OrderRequest)> {
        self.script.lock().placed.clone()
    }

    #[must_use]
    pub fn status_queries(&self) -> usize {
        self.script.lock().status_queries
    }
}

#[async_trait]
impl BrokerGateway for ScriptedBroker {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut script = self.script.lock();
        if let Some(error) = script.order_failures.pop_front() {
            return Err(error);
        }
        let order_id = format!("SCRIPT-{}", script.placed.len() + 1);
        script.placed.push((order_id.clone(), order.clone()));
        Ok(OrderAck {
            order_id,
            accepted_at: Utc::now(),
        })
    }

    async fn contract_status(&self, order_id: &str) -> Result<ContractStatus, BrokerError> {
        let mut script = self.script.lock();
        script.status_queries += 1;
        script
            .statuses
            .get(order_id)
            .cloned()
            .unwrap_or(Ok(ContractStatus::Pending))
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        if self.script.lock().unreachable {
            return Err(BrokerError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vtm_core::Direction;

    fn order() -> OrderRequest {
        OrderRequest {
            user_id: 3,
            asset: "R_50".to_string(),
            stake: dec!(1.00),
            direction: Direction::Rise,
        }
    }

    #[tokio::test]
    async fn test_queued_failure_then_success() {
        let broker = ScriptedBroker::new();
        broker.fail_next_order(BrokerError::Timeout(10));

        assert_eq!(
            broker.place_order(&order()).await.unwrap_err(),
            BrokerError::Timeout(10)
        );
        let ack = broker.place_order(&order()).await.unwrap();
        assert_eq!(ack.order_id, "SCRIPT-1");
        assert_eq!(broker.placed().len(), 1);
    }

    #[tokio::test]
    async fn test_status_defaults_to_pending() {
        let broker = ScriptedBroker::new();
        assert_eq!(
            broker.contract_status("SCRIPT-9").await.unwrap(),
            ContractStatus::Pending
        );

        broker.set_status("SCRIPT-9", Ok(ContractStatus::Won { payout: dec!(1.95) }));
        assert_eq!(
            broker.contract_status("SCRIPT-9").await.unwrap(),
            ContractStatus::Won { payout: dec!(1.95) }
        );
        assert_eq!(broker.status_queries(), 2);
    }
}
