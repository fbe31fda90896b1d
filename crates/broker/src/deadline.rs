//! Bounded per-call deadline for any broker gateway.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use vtm_core::{BrokerError, BrokerGateway, ContractStatus, OrderAck, OrderRequest};

/// Wraps a gateway so that no call can outlive `deadline`.
///
/// An elapsed deadline surfaces as [`BrokerError::Timeout`], which callers
/// treat as transient.
#[derive(Debug, Clone)]
pub struct DeadlineGateway<G> {
    inner: G,
    deadline: Duration,
}

impl<G: BrokerGateway> DeadlineGateway<G> {
    pub fn new(inner: G, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, BrokerError>> + Send,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    broker = self.inner.name(),
                    call,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Broker call exceeded deadline"
                );
                Err(BrokerError::Timeout(self.deadline.as_secs()))
            }
        }
    }
}

#[async_trait]
impl<G: BrokerGateway> BrokerGateway for DeadlineGateway<G> {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        self.bounded("place_order", self.inner.place_order(order))
            .await
    }

    async fn contract_status(&self, order_id: &str) -> Result<ContractStatus, BrokerError> {
        self.bounded("contract_status", self.inner.contract_status(order_id))
            .await
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.bounded("ping", self.inner.ping()).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
