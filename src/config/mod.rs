use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::limits::{LimitPolicy, RateTable};

/// Environment variable that overrides `database.path`
pub const DB_PATH_ENV: &str = "MINIBANK_DB_PATH";

/// Database configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Maximum number of connections in the connection pool
    pub max_connections: u32,
    /// How long a connection waits on a locked database before giving up
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Ledger configuration: currencies, limits and fees
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Currency the daily limit is expressed in
    pub base_currency: String,
    /// Fee charged on the part of a transaction above the daily limit
    pub overlimit_fee_rate: Decimal,
    /// Daily limit given to newly registered users, in base currency
    pub default_daily_limit: Decimal,
    /// Offset from UTC, in minutes, of the zone that decides what "today" is
    pub utc_offset_minutes: i32,
    /// Exchange rate of each supported currency against the base currency
    pub rates: BTreeMap<String, Decimal>,
}

impl LedgerConfig {
    /// Build the read-only rate table handed to the ledger
    pub fn rate_table(&self) -> Result<RateTable> {
        RateTable::new(&self.base_currency, self.rates.clone())
    }

    /// Build the limit policy handed to the ledger
    pub fn limit_policy(&self) -> Result<LimitPolicy> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("Invalid UTC offset: {} minutes", self.utc_offset_minutes))?;

        if self.overlimit_fee_rate.is_sign_negative() {
            return Err(anyhow!("Overlimit fee rate cannot be negative"));
        }

        Ok(LimitPolicy {
            overlimit_fee_rate: self.overlimit_fee_rate,
            timezone: offset,
        })
    }
}

/// Accounts cache configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Whether the accounts cache is used at all
    pub enabled: bool,
    /// Lifetime of a cached accounts list in seconds
    pub ttl_seconds: u64,
}

/// Global application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Application version
    pub version: String,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Ledger configuration
    pub ledger: LedgerConfig,
    /// Cache configuration
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("TJS".to_string(), Decimal::ONE);
        rates.insert("USD".to_string(), Decimal::new(921, 2));
        rates.insert("EUR".to_string(), Decimal::new(1072, 2));

        Self {
            app_name: "MiniBank Ledger".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseConfig {
                path: "data/minibank.db".to_string(),
                max_connections: 8,
                busy_timeout_ms: 5000,
            },
            ledger: LedgerConfig {
                base_currency: "TJS".to_string(),
                overlimit_fee_rate: Decimal::new(2, 2), // 2%
                default_daily_limit: Decimal::from(1000),
                utc_offset_minutes: 300, // Asia/Dushanbe
                rates,
            },
            cache: CacheConfig {
                enabled: true,
                ttl_seconds: 15 * 60,
            },
        }
    }
}

// Global configuration instance
lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::default());
}

/// Load configuration from file
pub fn load_config(path: &str) -> Result<()> {
    // Write the defaults out if the file is missing
    if !Path::new(path).exists() {
        let default_config = Config::default();
        save_config(path, &default_config)?;
        update_config(apply_env_overrides(default_config))?;
        return Ok(());
    }

    let mut file = File::open(path).context(format!("Failed to open config file: {}", path))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).context("Failed to read config file")?;

    let config: Config = match path.ends_with(".toml") {
        true => toml::from_str(&contents).context("Failed to parse TOML config")?,
        false => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
    };

    // Fail at load time rather than on the first withdrawal
    config.ledger.rate_table().context("Invalid currency rates in config")?;
    config.ledger.limit_policy().context("Invalid limit settings in config")?;

    update_config(apply_env_overrides(config))
}

/// Save configuration to file
pub fn save_config(path: &str, config: &Config) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
    }

    let serialized = match path.ends_with(".toml") {
        true => toml::to_string_pretty(config).context("Failed to serialize config to TOML")?,
        false => serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?,
    };

    std::fs::write(path, serialized).context(format!("Failed to write config to file: {}", path))?;

    Ok(())
}

fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
        if !db_path.trim().is_empty() {
            config.database.path = db_path;
        }
    }
    config
}

/// Get a copy of the current config
pub fn get_config() -> Config {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replace the current config
pub fn update_config(config: Config) -> Result<()> {
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = config;
    Ok(())
}
