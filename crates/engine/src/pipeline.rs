//! Signal pipeline: drains queued signals into trade instructions.
//!
//! Each signal is claimed (marked processed) before it is acted on, so a
//! signal is handled at most once even if the process dies mid-batch.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vtm_core::{Repository, Signal, TradeInstruction};

use crate::trading::{Placement, PlacementOutcome, TradingEngine};

/// Counts from one pipeline run.
///
/// `placed + skipped + rejected + failed` equals the number of signals this
/// run claimed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub selected: usize,
    /// At least one order went out.
    pub placed: usize,
    /// Valid, but every target was passed over.
    pub skipped: usize,
    /// Payload could not be translated.
    pub rejected: usize,
    /// Placement attempted and failed.
    pub failed: usize,
    /// Claimed by another worker between selection and claim.
    pub lost_claims: usize,
}

impl PipelineReport {
    /// Signals this run marked processed.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.placed + self.skipped + self.rejected + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalOutcome {
    Placed,
    Skipped,
    Rejected,
    Failed,
}

impl SignalOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    fn from_placements(placements: &[Placement]) -> Self {
        let any = |f: fn(&PlacementOutcome) -> bool| placements.iter().any(|p| f(&p.outcome));
        if any(|o| matches!(o, PlacementOutcome::Placed(_))) {
            Self::Placed
        } else if any(|o| matches!(o, PlacementOutcome::Failed(_))) {
            Self::Failed
        } else {
            Self::Skipped
        }
    }
}

pub struct SignalPipeline {
    repo: Arc<dyn Repository>,
    engine: Arc<TradingEngine>,
}

impl SignalPipeline {
    pub fn new(repo: Arc<dyn Repository>, engine: Arc<TradingEngine>) -> Self {
        Self { repo, engine }
    }

    /// Handles up to `batch_size` of the oldest unprocessed signals.
    ///
    /// # Errors
    /// Returns an error if the batch cannot be selected. Per-signal problems
    /// are logged and counted.
    pub async fn process_unprocessed_signals(&self, batch_size: usize) -> Result<PipelineReport> {
        self.process_unprocessed_signals_at(batch_size, Utc::now())
            .await
    }

    /// [`Self::process_unprocessed_signals`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the batch cannot be selected.
    pub async fn process_unprocessed_signals_at(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<PipelineReport> {
        let signals = self.repo.unprocessed_signals(batch_size).await?;
        let mut report = PipelineReport {
            selected: signals.len(),
            ..PipelineReport::default()
        };

        for signal in &signals {
            match self.repo.mark_signal_processed(signal.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(signal_id = signal.id, "Signal already claimed");
                    report.lost_claims += 1;
                    continue;
                }
                Err(e) => {
                    // Not claimed, so it stays queued for the next run.
                    error!(signal_id = signal.id, error = %e, "Failed to claim signal");
                    continue;
                }
            }

            let outcome = self.handle(signal, now).await;
            match outcome {
                SignalOutcome::Placed => report.placed += 1,
                SignalOutcome::Skipped => report.skipped += 1,
                SignalOutcome::Rejected => report.rejected += 1,
                SignalOutcome::Failed => report.failed += 1,
            }
            info!(signal_id = signal.id, outcome = outcome.as_str(), "Signal processed");
        }

        if report.selected > 0 {
            info!(
                selected = report.selected,
                processed = report.processed(),
                placed = report.placed,
                rejected = report.rejected,
                "Signal batch complete"
            );
        }
        Ok(report)
    }

    async fn handle(&self, signal: &Signal, now: DateTime<Utc>) -> SignalOutcome {
        let instruction = match TradeInstruction::from_payload(&signal.payload) {
            Ok(instruction) => instruction,
            Err(e) => {
                warn!(signal_id = signal.id, error = %e, "Signal rejected");
                return SignalOutcome::Rejected;
            }
        };

        match self
            .engine
            .place_instruction_at(&instruction, Some(signal.id), now)
            .await
        {
            Ok(placements) => {
                for placement in &placements {
                    debug!(
                        signal_id = signal.id,
                        user_id = placement.user_id,
                        outcome = ?placement.outcome,
                        "Signal placement"
                    );
                }
                SignalOutcome::from_placements(&placements)
            }
            Err(e) => {
                error!(signal_id = signal.id, error = %e, "Signal placement failed");
                SignalOutcome::Failed
            }
        }
    }

    /// Deletes signals older than `max_age_days`, processed or not.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn cleanup_old_signals(&self, max_age_days: u32) -> Result<u64> {
        self.cleanup_old_signals_at(max_age_days, Utc::now()).await
    }

    /// [`Self::cleanup_old_signals`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn cleanup_old_signals_at(&self, max_age_days: u32, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::days(i64::from(max_age_days));
        let deleted = self.repo.delete_signals_older_than(cutoff).await?;
        info!(max_age_days, deleted, "Old signals cleaned up");
        Ok(deleted)
    }
}
