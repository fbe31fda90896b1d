use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vtm_core::SchedulerConfig;

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send {
    fn name(&self) -> &str;

    /// Runs the job once. `now` is the wall-clock time of the iteration.
    async fn run(&mut self, now: DateTime<Utc>) -> Result<()>;
}

struct JobDescriptor {
    job: Box<dyn Job>,
    interval: chrono::Duration,
    last_run: Option<DateTime<Utc>>,
}

impl JobDescriptor {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }
}

/// How one job invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    TimedOut,
    Panicked,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub name: String,
    pub outcome: JobOutcome,
    pub elapsed_ms: u64,
}

/// Single-threaded dispatcher for jobs on independent cadences.
///
/// Jobs run one after another within an iteration. A job's failure, panic,
/// or timeout is logged and never reaches the loop.
pub struct Scheduler {
    jobs: Vec<JobDescriptor>,
    tick: Duration,
    job_timeout: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            jobs: Vec::new(),
            tick: config.tick(),
            job_timeout: config.job_timeout(),
        }
    }

    /// Registers a job. Jobs run in registration order and are due on the
    /// first iteration.
    #[must_use]
    pub fn with_job(mut self, job: Box<dyn Job>, interval: Duration) -> Self {
        self.add_job(job, interval);
        self
    }

    pub fn add_job(&mut self, job: Box<dyn Job>, interval: Duration) {
        info!(job = job.name(), interval_secs = interval.as_secs(), "Job registered");
        self.jobs.push(JobDescriptor {
            job,
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX),
            last_run: None,
        });
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|d| d.job.name()).collect()
    }

    /// When each job last started, in registration order.
    #[must_use]
    pub fn last_runs(&self) -> Vec<(&str, Option<DateTime<Utc>>)> {
        self.jobs
            .iter()
            .map(|d| (d.job.name(), d.last_run))
            .collect()
    }

    /// Runs every job due at `now`, sequentially.
    ///
    /// `last_run` is set to `now` for each job invoked, whatever its outcome.
    pub async fn run_iteration(&mut self, now: DateTime<Utc>) -> Vec<JobRun> {
        let mut runs = Vec::new();

        for descriptor in &mut self.jobs {
            if !descriptor.is_due(now) {
                continue;
            }
            descriptor.last_run = Some(now);

            let name = descriptor.job.name().to_string();
            let started = Instant::now();
            let guarded = tokio::time::timeout(self.job_timeout, descriptor.job.run(now));
            let outcome = match AssertUnwindSafe(guarded).catch_unwind().await {
                Ok(Ok(Ok(()))) => JobOutcome::Completed,
                Ok(Ok(Err(e))) => {
                    error!(job = %name, error = %e, "Job failed");
                    JobOutcome::Failed(format!("{e:#}"))
                }
                Ok(Err(_)) => {
                    error!(
                        job = %name,
                        timeout_secs = self.job_timeout.as_secs(),
                        "Job timed out"
                    );
                    JobOutcome::TimedOut
                }
                Err(_) => {
                    error!(job = %name, "Job panicked");
                    JobOutcome::Panicked
                }
            };

            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            debug!(job = %name, elapsed_ms, ?outcome, "Job finished");
            runs.push(JobRun {
                name,
                outcome,
                elapsed_ms,
            });
        }

        runs
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Shutdown is observed between iterations and while sleeping; a job in
    /// progress is allowed to finish.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            jobs = ?self.job_names(),
            tick_secs = self.tick.as_secs(),
            job_timeout_secs = self.job_timeout.as_secs(),
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_iteration(Utc::now()).await;

            tokio::select! {
                () = tokio::time::sleep(self.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_due_computed_from_wall_clock_delta() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(&SchedulerConfig::default()).with_job(
            Box::new(Counting {
                name: "counting",
                runs: runs.clone(),
            }),
            Duration::from_secs(60),
        );

        scheduler.run_iteration(t(0)).await;
        scheduler.run_iteration(t(10)).await;
        scheduler.run_iteration(t(59)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduler.run_iteration(t(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // A long stall still runs the job exactly once on the next iteration
        let ran = scheduler.run_iteration(t(1000)).await;
        assert_eq!(ran.len(), 1);
        assert_eq!(scheduler.last_runs()[0].1, Some(t(1000)));
    }
}
