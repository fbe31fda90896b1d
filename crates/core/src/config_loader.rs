use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

/// Default location of the TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging built-in defaults, the TOML file, a JSON
    /// sidecar, and `VTM_`-prefixed environment variables (nested keys split on
    /// `__`, e.g. `VTM_SCHEDULER__TICK_SECS`). `DATABASE_URL` wins over every
    /// other source for `database.url`.
    ///
    /// Missing files are skipped. The merged result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))?;

        config.validate()?;
        tracing::debug!(path, tick_secs = config.scheduler.tick_secs, "Configuration loaded");
        Ok(config)
    }

    /// Loads from [`DEFAULT_CONFIG_PATH`].
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_default() -> Result<AppConfig> {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    fn figment(path: &str) -> Figment {
        let json_path = std::path::Path::new(path).with_extension("json");

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .join(Json::file(json_path))
            .merge(Env::prefixed("VTM_").split("__"));

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                figment = figment.merge(("database.url", url));
            }
        }

        figment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntryRuleKind, MoneyManagementKind};
    use figment::Jail;
    use rust_decimal::Decimal;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load("config/missing.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.tick_secs, 10);
            assert_eq!(config.trading.interval_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn test_toml_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/Config.toml",
                r#"
                [signals]
                batch_size = 25

                [trading]
                entry_rule = "alternate"

                [trading.money_management]
                kind = "martingale"
                multiplier = 2.5
                "#,
            )?;

            let config = ConfigLoader::load_default().map_err(|e| e.to_string())?;
            assert_eq!(config.signals.batch_size, 25);
            assert_eq!(config.signals.retention_days, 30);
            assert_eq!(config.trading.entry_rule, EntryRuleKind::Alternate);
            assert_eq!(
                config.trading.money_management.kind,
                MoneyManagementKind::Martingale
            );
            assert_eq!(
                config.trading.money_management.multiplier,
                Decimal::new(25, 1)
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file("config/Config.toml", "[scheduler]\ntick_secs = 20\n")?;
            jail.set_env("VTM_SCHEDULER__TICK_SECS", "5");
            jail.set_env("DATABASE_URL", "postgres://db.internal/vtm");

            let config = ConfigLoader::load_default().map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.tick_secs, 5);
            assert_eq!(config.database.url, "postgres://db.internal/vtm");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_result_rejected() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file("config/Config.toml", "[signals]\nbatch_size = 0\n")?;
            assert!(ConfigLoader::load_default().is_err());
            Ok(())
        });
    }
}
