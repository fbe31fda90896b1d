//! Periodic dispatcher for the trading automation jobs.

pub mod jobs;
pub mod scheduler;

pub use jobs::{
    Components, ContractMonitorJob, MaintenanceJob, SignalPipelineJob, TradingLoopJob,
};
pub use scheduler::{Job, JobOutcome, JobRun, Scheduler};
