//! Persistence for the trading automation engine.
//!
//! This crate provides:
//! - `PostgreSQL` connection, embedded migrations, and schema verification
//! - Table repositories bundled as [`PgRepository`]
//! - [`MemoryRepository`] for paper runs and tests

pub mod database;
pub mod memory;
pub mod repositories;

pub use database::{
    connect, ensure_complete, run_migrations, verify_schema, TableCheck, REQUIRED_TABLES,
};
pub use memory::MemoryRepository;
pub use repositories::{
    PgRepository, SessionRepository, SettingsRepository, SignalRepository, TradeRepository,
};
