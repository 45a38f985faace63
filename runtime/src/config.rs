//! Runtime configuration for [`KeyedBus`](crate::KeyedBus).
//!
//! Values come from code (builder methods) or from the environment:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `DEMANDBUS_NOTICE_CAPACITY` | `notice_capacity` | 64 |
//! | `DEMANDBUS_MAX_CHAIN_DEPTH` | `max_chain_depth` | 16 |

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Environment variable for [`BusConfig::notice_capacity`]
pub const NOTICE_CAPACITY_VAR: &str = "DEMANDBUS_NOTICE_CAPACITY";

/// Environment variable for [`BusConfig::max_chain_depth`]
pub const MAX_CHAIN_DEPTH_VAR: &str = "DEMANDBUS_MAX_CHAIN_DEPTH";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name
        var: String,
        /// Raw value
        value: String,
    },

    /// A value parsed but failed validation
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Configuration for `KeyedBus` instances
///
/// # Example
///
/// ```
/// use demandbus_runtime::BusConfig;
///
/// let config = BusConfig::default()
///     .with_notice_capacity(256)
///     .with_max_chain_depth(4);
/// assert_eq!(config.max_chain_depth, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Buffer size of the notice broadcast channel. Slow observers that fall
    /// further behind than this miss notices; publishers never block on them.
    pub notice_capacity: usize,
    /// Maximum depth of chained publications applied under one publish.
    /// Deeper follow-ups are dropped.
    pub max_chain_depth: usize,
}

impl BusConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(notice_capacity: usize, max_chain_depth: usize) -> Self {
        Self {
            notice_capacity,
            max_chain_depth,
        }
    }

    /// Set the notice broadcast capacity
    #[must_use]
    pub const fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    /// Set the maximum chained publish depth
    #[must_use]
    pub const fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Load configuration from the environment, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to something that is not
    /// a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            notice_capacity: parse_var(&lookup, NOTICE_CAPACITY_VAR)?
                .unwrap_or(defaults.notice_capacity),
            max_chain_depth: parse_var(&lookup, MAX_CHAIN_DEPTH_VAR)?
                .unwrap_or(defaults.max_chain_depth),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for zero capacity or depth.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notice_capacity == 0 {
            return Err(ConfigError::Validation(
                "notice_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_chain_depth == 0 {
            return Err(ConfigError::Validation(
                "max_chain_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            notice_capacity: 64,
            max_chain_depth: 16,
        }
    }
}

fn parse_var<F>(lookup: &F, var: &str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value,
            })
        })
        .transpose()
}
