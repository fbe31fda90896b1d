//! Scheduler isolation and job wiring against the in-memory repository.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::watch;

use vtm_broker::ScriptedBroker;
use vtm_core::{AppConfig, SchedulerConfig, UserSettings};
use vtm_data::MemoryRepository;
use vtm_scheduler::{Components, Job, JobOutcome, Scheduler};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Hang,
}

struct TestJob {
    name: &'static str,
    behaviour: Behaviour,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Job for TestJob {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
        self.log.lock().push(self.name);
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => anyhow::bail!("storage unavailable"),
            Behaviour::Panic => panic!("job exploded"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

fn job(
    name: &'static str,
    behaviour: Behaviour,
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> Box<dyn Job> {
    Box::new(TestJob {
        name,
        behaviour,
        log: log.clone(),
    })
}

#[tokio::test]
async fn test_failing_job_does_not_stop_the_others() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(&SchedulerConfig::default())
        .with_job(job("first", Behaviour::Fail, &log), Duration::from_secs(60))
        .with_job(job("second", Behaviour::Succeed, &log), Duration::from_secs(60));

    let runs = scheduler.run_iteration(t0()).await;

    assert_eq!(*log.lock(), vec!["first", "second"]);
    assert!(matches!(runs[0].outcome, JobOutcome::Failed(ref msg) if msg.contains("storage")));
    assert_eq!(runs[1].outcome, JobOutcome::Completed);

    // The failed job is not retried before its interval elapses
    let runs = scheduler.run_iteration(t0() + chrono::Duration::seconds(10)).await;
    assert!(runs.is_empty());
    assert_eq!(scheduler.last_runs()[0].1, Some(t0()));
}

#[tokio::test]
async fn test_panicking_job_is_contained() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(&SchedulerConfig::default())
        .with_job(job("boom", Behaviour::Panic, &log), Duration::from_secs(10))
        .with_job(job("steady", Behaviour::Succeed, &log), Duration::from_secs(10));

    let runs = scheduler.run_iteration(t0()).await;
    assert_eq!(runs[0].outcome, JobOutcome::Panicked);
    assert_eq!(runs[1].outcome, JobOutcome::Completed);

    // Still scheduled afterwards
    let runs = scheduler.run_iteration(t0() + chrono::Duration::seconds(10)).await;
    assert_eq!(runs.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_job_times_out() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = SchedulerConfig {
        job_timeout_secs: 5,
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(&config)
        .with_job(job("hung", Behaviour::Hang, &log), Duration::from_secs(10))
        .with_job(job("after", Behaviour::Succeed, &log), Duration::from_secs(10));

    let runs = scheduler.run_iteration(t0()).await;
    assert_eq!(runs[0].outcome, JobOutcome::TimedOut);
    assert_eq!(runs[1].outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_jobs_on_independent_cadences() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(&SchedulerConfig::default())
        .with_job(job("fast", Behaviour::Succeed, &log), Duration::from_secs(15))
        .with_job(job("slow", Behaviour::Succeed, &log), Duration::from_secs(60));

    for secs in (0..=60).step_by(10) {
        scheduler
            .run_iteration(t0() + chrono::Duration::seconds(secs))
            .await;
    }

    let log = log.lock();
    // fast: 0, 20, 40, 60 (ticks every 10s, due every 15s); slow: 0, 60
    assert_eq!(log.iter().filter(|n| **n == "fast").count(), 4);
    assert_eq!(log.iter().filter(|n| **n == "slow").count(), 2);
}

struct Counter(Arc<AtomicUsize>);

#[async_trait]
impl Job for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn run(&mut self, _now: DateTime<Utc>) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(&SchedulerConfig::default())
        .with_job(Box::new(Counter(runs.clone())), Duration::from_secs(1));
    let (tx, rx) = watch::channel(false);

    let stopper = async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
    };
    tokio::join!(scheduler.run(rx), stopper);

    assert!(runs.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_run_returns_when_already_shut_down() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut scheduler = Scheduler::new(&SchedulerConfig::default())
        .with_job(Box::new(Counter(runs.clone())), Duration::from_secs(1));
    let (_tx, rx) = watch::channel(true);

    scheduler.run(rx).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Wired jobs
// ============================================================================

fn wired() -> (Arc<MemoryRepository>, Arc<ScriptedBroker>, Components, AppConfig) {
    let repo = Arc::new(MemoryRepository::new());
    let broker = Arc::new(ScriptedBroker::new());
    repo.upsert_settings(UserSettings {
        user_id: 1,
        stake: dec!(1.00),
        target: dec!(100.00),
        stop_limit: dec!(50.00),
        is_bot_active: true,
        daily_profit: dec!(0),
        daily_loss: dec!(0),
        reset_date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
    });
    let config = AppConfig::default();
    let components = Components::new(repo.clone(), broker.clone(), &config);
    (repo, broker, components, config)
}

#[tokio::test]
async fn test_signal_cleanup_runs_once_per_day() {
    let (repo, _broker, components, config) = wired();
    let mut signal_job = components.signal_job(&config);

    repo.push_signal(json!({}), t0() - chrono::Duration::days(40));
    signal_job.run(t0()).await.unwrap();
    assert_eq!(signal_job.last_cleanup(), Some(t0().date_naive()));
    assert!(repo.signals_snapshot().is_empty());

    // Same day: retention is not applied again
    let stale = repo.push_signal(json!({}), t0() - chrono::Duration::days(40));
    signal_job
        .run(t0() + chrono::Duration::hours(3))
        .await
        .unwrap();
    assert!(repo.signals_snapshot().iter().any(|s| s.id == stale));

    // Next day it is
    signal_job
        .run(t0() + chrono::Duration::days(1))
        .await
        .unwrap();
    assert!(repo.signals_snapshot().is_empty());
}

#[tokio::test]
async fn test_failed_cleanup_is_retried_the_same_day() {
    let (repo, _broker, components, config) = wired();
    let mut signal_job = components.signal_job(&config);

    repo.set_offline(true);
    assert!(signal_job.run(t0()).await.is_err());
    assert_eq!(signal_job.last_cleanup(), None);

    repo.set_offline(false);
    signal_job
        .run(t0() + chrono::Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(signal_job.last_cleanup(), Some(t0().date_naive()));
}

#[tokio::test]
async fn test_maintenance_job_invokes_repository() {
    let (repo, _broker, components, _config) = wired();
    let mut maintenance = components.maintenance_job();

    maintenance.run(t0()).await.unwrap();
    maintenance.run(t0()).await.unwrap();
    assert_eq!(repo.maintenance_runs(), 2);
}

#[tokio::test]
async fn test_standard_scheduler_drives_signal_to_order() {
    let (repo, broker, components, config) = wired();
    let mut scheduler = components.scheduler(&config);
    assert_eq!(
        scheduler.job_names(),
        vec!["trading_loop", "signal_pipeline", "contract_monitor", "maintenance"]
    );

    repo.push_signal(json!({"asset": "R_100", "direction": "CALL"}), t0());
    let runs = scheduler.run_iteration(t0()).await;

    assert!(runs.iter().all(|r| r.outcome == JobOutcome::Completed));
    assert_eq!(broker.placed().len(), 1);
    assert_eq!(repo.maintenance_runs(), 1);
    assert!(repo.signals_snapshot()[0].processed_at.is_some());
}

#[tokio::test]
async fn test_storage_outage_fails_jobs_but_not_the_scheduler() {
    let (repo, _broker, components, config) = wired();
    let mut scheduler = components.scheduler(&config);

    repo.set_offline(true);
    let runs = scheduler.run_iteration(t0()).await;
    assert_eq!(runs.len(), 4);
    assert!(runs
        .iter()
        .all(|r| matches!(r.outcome, JobOutcome::Failed(_))));

    repo.set_offline(false);
    let runs = scheduler
        .run_iteration(t0() + chrono::Duration::seconds(60))
        .await;
    assert!(runs.iter().all(|r| r.outcome == JobOutcome::Completed));
}
