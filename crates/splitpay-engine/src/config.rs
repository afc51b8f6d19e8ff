//! # Engine Configuration
//!
//! Default rates, reward thresholds, storage and provider settings.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SPLITPAY_TAX_BPS=1250                                              │
//! │     SPLITPAY_DB_PATH=/var/lib/splitpay/splitpay.db                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/splitpay/splitpay.toml (Linux)                           │
//! │     ~/Library/Application Support/com.splitpay.splitpay/... (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10% tax, 5% service, Golden ≤ 24h, Silver ≤ 48h                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # splitpay.toml
//! [rates]
//! tax_bps = 1000
//! service_bps = 500
//!
//! [rewards]
//! golden_within_hours = 24
//! silver_within_hours = 48
//!
//! [sessions]
//! join_code_attempts = 8
//!
//! [storage]
//! database_path = "splitpay.db"
//! max_connections = 5
//! timeout_ms = 5000
//!
//! [provider]
//! timeout_ms = 10000
//! ```

use serde::{Deserialize, Serialize};
use splitpay_core::validation::validate_rates;
use splitpay_core::{Rate, RewardPolicy, SplitRates};
use splitpay_db::DbConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Sections
// =============================================================================

/// Default tax and service rates for new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesSettings {
    #[serde(default = "default_tax_bps")]
    pub tax_bps: u32,

    #[serde(default = "default_service_bps")]
    pub service_bps: u32,
}

fn default_tax_bps() -> u32 {
    1000
}

fn default_service_bps() -> u32 {
    500
}

impl Default for RatesSettings {
    fn default() -> Self {
        RatesSettings {
            tax_bps: default_tax_bps(),
            service_bps: default_service_bps(),
        }
    }
}

/// Reward tier thresholds, measured from request to payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSettings {
    #[serde(default = "default_golden_hours")]
    pub golden_within_hours: i64,

    #[serde(default = "default_silver_hours")]
    pub silver_within_hours: i64,
}

fn default_golden_hours() -> i64 {
    24
}

fn default_silver_hours() -> i64 {
    48
}

impl Default for RewardSettings {
    fn default() -> Self {
        RewardSettings {
            golden_within_hours: default_golden_hours(),
            silver_within_hours: default_silver_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// How many fresh join codes to try before giving up on a collision.
    #[serde(default = "default_join_code_attempts")]
    pub join_code_attempts: u32,
}

fn default_join_code_attempts() -> u32 {
    8
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            join_code_attempts: default_join_code_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound on any single storage call.
    #[serde(default = "default_storage_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("splitpay.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_storage_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            timeout_ms: default_storage_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Upper bound on handing a charge to the payment provider.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rates: RatesSettings,

    #[serde(default)]
    pub rewards: RewardSettings,

    #[serde(default)]
    pub sessions: SessionSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub provider: ProviderSettings,
}

impl EngineConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Read `config_path`, or the platform default path, if it exists
    /// 3. Apply environment variable overrides
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        validate_rates(&self.split_rates())?;

        if self.rewards.golden_within_hours < 0 {
            return Err(EngineError::Config(
                "golden_within_hours must not be negative".into(),
            ));
        }
        if self.rewards.golden_within_hours > self.rewards.silver_within_hours {
            return Err(EngineError::Config(format!(
                "golden_within_hours ({}) must not exceed silver_within_hours ({})",
                self.rewards.golden_within_hours, self.rewards.silver_within_hours
            )));
        }

        if self.sessions.join_code_attempts == 0 {
            return Err(EngineError::Config(
                "join_code_attempts must be greater than 0".into(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(EngineError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.storage.timeout_ms == 0 || self.provider.timeout_ms == 0 {
            return Err(EngineError::Config("timeouts must be greater than 0".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(bps) = env_parse::<u32>("SPLITPAY_TAX_BPS") {
            debug!(tax_bps = bps, "Overriding tax rate from environment");
            self.rates.tax_bps = bps;
        }

        if let Some(bps) = env_parse::<u32>("SPLITPAY_SERVICE_BPS") {
            debug!(service_bps = bps, "Overriding service rate from environment");
            self.rates.service_bps = bps;
        }

        if let Ok(path) = std::env::var("SPLITPAY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = PathBuf::from(path);
        }

        if let Some(ms) = env_parse::<u64>("SPLITPAY_STORAGE_TIMEOUT_MS") {
            self.storage.timeout_ms = ms;
        }

        if let Some(ms) = env_parse::<u64>("SPLITPAY_PROVIDER_TIMEOUT_MS") {
            self.provider.timeout_ms = ms;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "splitpay", "splitpay")
            .map(|dirs| dirs.config_dir().join("splitpay.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Rates new sessions start with.
    pub fn split_rates(&self) -> SplitRates {
        SplitRates::new(
            Rate::from_bps(self.rates.tax_bps),
            Rate::from_bps(self.rates.service_bps),
        )
    }

    pub fn reward_policy(&self) -> RewardPolicy {
        RewardPolicy::from_hours(
            self.rewards.golden_within_hours,
            self.rewards.silver_within_hours,
        )
    }

    /// Pool settings for the storage collaborator.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.storage.database_path.clone())
            .max_connections(self.storage.max_connections)
            .connect_timeout(self.storage_timeout())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider.timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.split_rates(), SplitRates::default());
        assert_eq!(config.reward_policy(), RewardPolicy::default());
        assert_eq!(config.sessions.join_code_attempts, 8);
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [rates]
            tax_bps = 1250

            [provider]
            timeout_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(config.rates.tax_bps, 1250);
        assert_eq!(config.rates.service_bps, 500);
        assert_eq!(config.rewards.silver_within_hours, 48);
        assert_eq!(config.provider_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.rates.tax_bps = 10_001;
        assert!(config.validate().is_err());

        config.rates.tax_bps = 1000;
        config.rewards.golden_within_hours = 72;
        assert!(config.validate().is_err());

        config.rewards.golden_within_hours = 24;
        config.sessions.join_code_attempts = 0;
        assert!(config.validate().is_err());

        config.sessions.join_code_attempts = 1;
        config.storage.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.storage.timeout_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("splitpay-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[rewards]\ngolden_within_hours = 12\nsilver_within_hours = 36\n",
        )
        .unwrap();

        let config = EngineConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.reward_policy(), RewardPolicy::from_hours(12, 36));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[rates]"));
        assert!(toml_str.contains("[storage]"));
    }
}
