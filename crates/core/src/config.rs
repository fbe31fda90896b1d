use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub trading: TradingConfig,
    pub signals: SignalConfig,
    pub monitor: MonitorConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/vtm".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between scheduler iterations.
    pub tick_secs: u64,
    /// Ceiling on a single job invocation.
    pub job_timeout_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            job_timeout_secs: 120,
            maintenance_interval_secs: 600,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRuleKind {
    SignalsOnly,
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyManagementKind {
    Flat,
    Martingale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyManagementConfig {
    pub kind: MoneyManagementKind,
    /// Stake multiplier applied per consecutive loss (martingale only).
    pub multiplier: Decimal,
    /// Consecutive losses to escalate through before resetting (martingale only).
    pub max_steps: u32,
}

impl MoneyManagementConfig {
    /// Upper bound on `max_steps`.
    pub const MAX_STEPS_LIMIT: u32 = 20;
}

impl Default for MoneyManagementConfig {
    fn default() -> Self {
        Self {
            kind: MoneyManagementKind::Flat,
            multiplier: Decimal::TWO,
            max_steps: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub interval_secs: u64,
    /// A session is stale after this many scheduler ticks without a heartbeat.
    pub stale_session_ticks: u32,
    pub default_asset: String,
    pub entry_rule: EntryRuleKind,
    pub money_management: MoneyManagementConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stale_session_ticks: 30,
            default_asset: "R_100".to_string(),
            entry_rule: EntryRuleKind::SignalsOnly,
            money_management: MoneyManagementConfig::default(),
        }
    }
}

impl TradingConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub retention_days: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 10,
            retention_days: 30,
        }
    }
}

impl SignalConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    /// Live trades older than this are forced to `error`.
    pub max_open_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            max_open_duration_secs: 3600,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub fn max_open_duration(&self) -> Duration {
        Duration::from_secs(self.max_open_duration_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Deadline applied to every gateway call.
    pub request_timeout_secs: u64,
    pub paper: PaperBrokerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            paper: PaperBrokerConfig::default(),
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperBrokerConfig {
    /// Payout on a winning contract as a multiple of stake.
    pub payout_multiplier: Decimal,
    /// Seconds from placement until a paper contract settles.
    pub contract_duration_secs: u64,
    pub win_probability: f64,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            payout_multiplier: Decimal::new(195, 2),
            contract_duration_secs: 60,
            win_probability: 0.5,
        }
    }
}

impl AppConfig {
    /// Stale threshold for trading sessions.
    #[must_use]
    pub fn stale_session_threshold(&self) -> Duration {
        self.scheduler.tick() * self.trading.stale_session_ticks
    }

    /// Rejects settings that would stall or corrupt the jobs.
    ///
    /// # Errors
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("scheduler.tick_secs", self.scheduler.tick_secs),
            ("scheduler.job_timeout_secs", self.scheduler.job_timeout_secs),
            (
                "scheduler.maintenance_interval_secs",
                self.scheduler.maintenance_interval_secs,
            ),
            ("trading.interval_secs", self.trading.interval_secs),
            ("signals.interval_secs", self.signals.interval_secs),
            ("monitor.interval_secs", self.monitor.interval_secs),
            ("broker.request_timeout_secs", self.broker.request_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }

        if self.trading.stale_session_ticks == 0 {
            anyhow::bail!("trading.stale_session_ticks must be greater than zero");
        }
        if self.signals.batch_size == 0 {
            anyhow::bail!("signals.batch_size must be greater than zero");
        }
        if self.signals.retention_days == 0 {
            anyhow::bail!("signals.retention_days must be greater than zero");
        }
        if self.trading.money_management.kind == MoneyManagementKind::Martingale
            && self.trading.money_management.multiplier <= Decimal::ZERO
        {
            anyhow::bail!("trading.money_management.multiplier must be positive");
        }
        if self.trading.money_management.max_steps > MoneyManagementConfig::MAX_STEPS_LIMIT {
            anyhow::bail!(
                "trading.money_management.max_steps ({}) exceeds {}",
                self.trading.money_management.max_steps,
                MoneyManagementConfig::MAX_STEPS_LIMIT
            );
        }
        if self.monitor.max_open_duration_secs < self.monitor.interval_secs {
            anyhow::bail!(
                "monitor.max_open_duration_secs ({}) is shorter than monitor.interval_secs ({})",
                self.monitor.max_open_duration_secs,
                self.monitor.interval_secs
            );
        }
        if !(0.0..=1.0).contains(&self.broker.paper.win_probability) {
            anyhow::bail!("broker.paper.win_probability must be within 0.0..=1.0");
        }

        Ok(())
    }
}
