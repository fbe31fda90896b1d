//! Broker gateway implementations.
//!
//! - [`DeadlineGateway`]: bounds every call of an inner gateway
//! - [`PaperBroker`]: simulated binary contracts for paper runs
//! - [`ScriptedBroker`]: caller-controlled answers for exercising the jobs

pub mod deadline;
pub mod paper;
pub mod scripted;

pub use deadline::DeadlineGateway;
pub use paper::PaperBroker;
pub use scripted::ScriptedBroker;
