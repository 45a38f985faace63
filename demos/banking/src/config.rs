//! Banking demo configuration.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `BANK_SEED_ACCOUNTS` | `number=amount` pairs, comma separated | `123456=1300.00,999999=400.00,111111=1000.00` |
//! | `METRICS_ENABLED` | install the Prometheus recorder | `false` |
//! | `METRICS_ADDR` | address advertised for scraping | `0.0.0.0:9000` |
//!
//! Bus tuning comes from [`BusConfig::from_env`].

use demandbus_core::RoutingKey;
use demandbus_runtime::BusConfig;
use rust_decimal::Decimal;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Accounts opened at startup unless `BANK_SEED_ACCOUNTS` says otherwise
pub const DEFAULT_SEED_ACCOUNTS: &str = "123456=1300.00,999999=400.00,111111=1000.00";

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9000";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A seed entry is not `number=amount`
    #[error("Invalid seed account entry '{0}'")]
    Seed(String),

    /// A boolean flag is not `true`/`false`/`1`/`0`
    #[error("Invalid value for {var}: {value:?}")]
    Flag {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// The metrics address does not parse
    #[error("Invalid metrics address '{0}'")]
    Address(String),

    /// Bus settings are invalid
    #[error(transparent)]
    Bus(#[from] demandbus_runtime::ConfigError),
}

/// Banking demo configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Accounts opened at startup, in order
    pub seed_accounts: Vec<(RoutingKey, Decimal)>,
    /// Whether to install the Prometheus recorder
    pub metrics_enabled: bool,
    /// Address advertised for scraping
    pub metrics_addr: SocketAddr,
    /// Bus tuning
    pub bus: BusConfig,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seeds = lookup("BANK_SEED_ACCOUNTS").unwrap_or_else(|| DEFAULT_SEED_ACCOUNTS.to_string());
        let metrics_enabled = match lookup("METRICS_ENABLED") {
            Some(value) => parse_flag("METRICS_ENABLED", &value)?,
            None => false,
        };
        let addr = lookup("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());

        Ok(Self {
            seed_accounts: parse_seeds(&seeds)?,
            metrics_enabled,
            metrics_addr: addr
                .trim()
                .parse()
                .map_err(|_| ConfigError::Address(addr.clone()))?,
            bus: BusConfig::from_lookup(lookup)?,
        })
    }
}

/// Parse `number=amount,number=amount`. Blank input seeds nothing.
fn parse_seeds(raw: &str) -> Result<Vec<(RoutingKey, Decimal)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (number, amount) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::Seed(entry.to_string()))?;
            let key = RoutingKey::from_str(number.trim())
                .map_err(|_| ConfigError::Seed(entry.to_string()))?;
            let amount = Decimal::from_str(amount.trim())
                .map_err(|_| ConfigError::Seed(entry.to_string()))?;
            Ok((key, amount))
        })
        .collect()
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Flag {
            var,
            value: value.to_string(),
        }),
    }
}
