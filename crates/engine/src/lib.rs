//! The three scheduled jobs.
//!
//! - [`TradingEngine`]: per-user risk state machine, order placement, session
//!   liveness, health checks
//! - [`SignalPipeline`]: at-most-once translation of queued signals into orders
//! - [`ContractMonitor`]: settlement of open trades into the daily accumulators
//!
//! All three are stateless between runs; every call re-reads what it needs
//! through the injected [`vtm_core::Repository`] and [`vtm_core::BrokerGateway`].

pub mod health;
mod limits;
pub mod monitor;
pub mod pipeline;
pub mod trading;

pub use health::HealthReport;
pub use monitor::{realized_pnl, ContractMonitor, MonitorReport};
pub use pipeline::{PipelineReport, SignalPipeline};
pub use trading::{
    Placement, PlacementOutcome, SessionCleanupReport, SkipReason, TradingEngine,
    TradingLoopReport,
};
