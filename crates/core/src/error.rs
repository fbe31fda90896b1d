//! Error types for the broker seam and signal validation.

use thiserror::Error;

/// Errors returned by a [`crate::BrokerGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The call exceeded its deadline.
    #[error("broker request timed out after {0}s")]
    Timeout(u64),

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The broker refused the order.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The broker has no record of the contract.
    #[error("unknown contract: {order_id}")]
    UnknownContract {
        /// The order id that was looked up.
        order_id: String,
    },

    /// The broker is temporarily not accepting requests.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// Creates an unknown contract error.
    pub fn unknown_contract(order_id: impl Into<String>) -> Self {
        Self::UnknownContract {
            order_id: order_id.into(),
        }
    }

    /// Returns true if the same call may succeed on a later cycle.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Network(_) | Self::Unavailable(_)
        )
    }
}

/// Reasons a signal payload cannot become a trade instruction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    /// Payload is not a JSON object.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A required field is absent or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Direction not recognised.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// Stake override is not a positive decimal.
    #[error("invalid stake: {0}")]
    InvalidStake(String),

    /// `user_id` is not an integer.
    #[error("invalid user id: {0}")]
    InvalidUser(String),
}
