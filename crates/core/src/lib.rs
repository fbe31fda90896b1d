pub mod config;
pub mod config_loader;
pub mod entry;
pub mod error;
pub mod instruction;
pub mod models;
pub mod risk;
pub mod stake;
pub mod traits;

pub use config::{
    AppConfig, BrokerConfig, DatabaseConfig, EntryRuleKind, MonitorConfig, MoneyManagementConfig,
    MoneyManagementKind, PaperBrokerConfig, SchedulerConfig, SignalConfig, TradingConfig,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use entry::{entry_rule_from_config, Entry, EntryRule};
pub use error::{BrokerError, SignalError};
pub use instruction::{InstructionTarget, TradeInstruction};
pub use models::{
    ContractStatus, Direction, NewTrade, OrderAck, OrderRequest, SessionStatus, Settlement,
    Signal, Trade, TradeOutcome, TradeStatus, TradingSession, UserSettings,
};
pub use risk::{apply_daily_reset, daily_reset_due, RiskState};
pub use stake::{stake_rule_from_config, FlatStake, Martingale, StakeRule};
pub use traits::{BrokerGateway, Repository};
