use serde::Serialize;

/// Observations gathered by [`crate::TradingEngine::perform_health_check`].
///
/// Anomalies are reported here and logged; they never stop the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub storage_reachable: bool,
    pub broker_reachable: bool,
    /// Live trades older than the maximum open duration.
    pub overdue_trades: usize,
    /// Sessions whose heartbeat is older than half the stale threshold.
    pub stale_sessions: usize,
    pub unprocessed_signals: u64,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.storage_reachable
            && self.broker_reachable
            && self.overdue_trades == 0
            && self.stale_sessions == 0
    }
}
