//! Adapters exposing the engine operations as scheduler jobs.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use vtm_core::{AppConfig, BrokerGateway, Repository};
use vtm_engine::{ContractMonitor, SignalPipeline, TradingEngine};

use crate::scheduler::{Job, Scheduler};

/// Trading loop, then stale-session cleanup, then the health check.
pub struct TradingLoopJob {
    engine: Arc<TradingEngine>,
}

impl TradingLoopJob {
    pub fn new(engine: Arc<TradingEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Job for TradingLoopJob {
    fn name(&self) -> &str {
        "trading_loop"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let loop_result = self.engine.process_trading_loop_at(now).await;
        if let Ok(report) = &loop_result {
            if report.placed > 0 || report.halted > 0 || report.failed > 0 {
                info!(
                    users = report.users,
                    placed = report.placed,
                    halted = report.halted,
                    failed = report.failed,
                    "Trading loop pass"
                );
            }
        }

        let cleanup_result = self.engine.cleanup_stale_sessions_at(now).await;
        if let Err(e) = &cleanup_result {
            error!(error = %e, "Stale session cleanup failed");
        }

        let health = self.engine.perform_health_check_at(now).await;
        if !health.is_healthy() {
            warn!(?health, "Health check reported anomalies");
        }

        loop_result?;
        cleanup_result?;
        Ok(())
    }
}

/// Signal batch, plus the once-per-day retention cleanup.
pub struct SignalPipelineJob {
    pipeline: Arc<SignalPipeline>,
    batch_size: usize,
    retention_days: u32,
    last_cleanup: Option<NaiveDate>,
}

impl SignalPipelineJob {
    pub fn new(pipeline: Arc<SignalPipeline>, batch_size: usize, retention_days: u32) -> Self {
        Self {
            pipeline,
            batch_size,
            retention_days,
            last_cleanup: None,
        }
    }

    #[must_use]
    pub fn last_cleanup(&self) -> Option<NaiveDate> {
        self.last_cleanup
    }
}

#[async_trait]
impl Job for SignalPipelineJob {
    fn name(&self) -> &str {
        "signal_pipeline"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let batch = self
            .pipeline
            .process_unprocessed_signals_at(self.batch_size, now)
            .await;

        let today = now.date_naive();
        if self.last_cleanup != Some(today) {
            match self
                .pipeline
                .cleanup_old_signals_at(self.retention_days, now)
                .await
            {
                Ok(_) => self.last_cleanup = Some(today),
                // Left unset so the next run today tries again.
                Err(e) => error!(error = %e, "Signal cleanup failed"),
            }
        }

        let report = batch?;
        debug!(processed = report.processed(), "Signal pipeline pass");
        Ok(())
    }
}

pub struct ContractMonitorJob {
    monitor: Arc<ContractMonitor>,
}

impl ContractMonitorJob {
    pub fn new(monitor: Arc<ContractMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Job for ContractMonitorJob {
    fn name(&self) -> &str {
        "contract_monitor"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let report = self.monitor.process_contract_results_at(now).await?;
        if report.won + report.lost + report.expired > 0 {
            info!(
                won = report.won,
                lost = report.lost,
                expired = report.expired,
                limits_hit = report.limits_hit,
                "Contracts settled"
            );
        }
        Ok(())
    }
}

/// Storage hygiene hook.
pub struct MaintenanceJob {
    repo: Arc<dyn Repository>,
}

impl MaintenanceJob {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Job for MaintenanceJob {
    fn name(&self) -> &str {
        "maintenance"
    }

    async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
        self.repo.maintenance().await
    }
}

/// The engine components wired to one repository and broker.
pub struct Components {
    pub repo: Arc<dyn Repository>,
    pub engine: Arc<TradingEngine>,
    pub pipeline: Arc<SignalPipeline>,
    pub monitor: Arc<ContractMonitor>,
}

impl Components {
    pub fn new(
        repo: Arc<dyn Repository>,
        broker: Arc<dyn BrokerGateway>,
        config: &AppConfig,
    ) -> Self {
        let engine = Arc::new(TradingEngine::new(repo.clone(), broker.clone(), config));
        let pipeline = Arc::new(SignalPipeline::new(repo.clone(), engine.clone()));
        let monitor = Arc::new(ContractMonitor::new(repo.clone(), broker, config));
        Self {
            repo,
            engine,
            pipeline,
            monitor,
        }
    }

    pub fn trading_job(&self) -> TradingLoopJob {
        TradingLoopJob::new(self.engine.clone())
    }

    pub fn signal_job(&self, config: &AppConfig) -> SignalPipelineJob {
        SignalPipelineJob::new(
            self.pipeline.clone(),
            config.signals.batch_size,
            config.signals.retention_days,
        )
    }

    pub fn contract_job(&self) -> ContractMonitorJob {
        ContractMonitorJob::new(self.monitor.clone())
    }

    pub fn maintenance_job(&self) -> MaintenanceJob {
        MaintenanceJob::new(self.repo.clone())
    }

    /// Scheduler with the three jobs and the maintenance hook on their
    /// configured cadences.
    pub fn scheduler(&self, config: &AppConfig) -> Scheduler {
        Scheduler::new(&config.scheduler)
            .with_job(Box::new(self.trading_job()), config.trading.interval())
            .with_job(Box::new(self.signal_job(config)), config.signals.interval())
            .with_job(Box::new(self.contract_job()), config.monitor.interval())
            .with_job(
                Box::new(self.maintenance_job()),
                config.scheduler.maintenance_interval(),
            )
    }
}
