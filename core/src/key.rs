//! Routing keys for the command bus.
//!
//! A [`RoutingKey`] names exactly one entity registered on a bus (an account
//! number, for instance) and selects which entity a command is applied to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `RoutingKey` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid routing key: {0}")]
pub struct ParseRoutingKeyError(String);

/// Identifier selecting the entity a command targets.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty or whitespace-bearing keys)
/// - `From::from()` and `new()`: No validation (for trusted, application-built keys)
///
/// Keys are ordered so that a bus can lock several entities in a canonical order.
///
/// # Examples
///
/// ```
/// use demandbus_core::key::RoutingKey;
///
/// let key = RoutingKey::new("123456");
/// assert_eq!(key.as_str(), "123456");
///
/// let parsed: RoutingKey = "999999".parse().unwrap();
/// assert_eq!(parsed, RoutingKey::new("999999"));
/// assert!("".parse::<RoutingKey>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Create a new `RoutingKey` from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `RoutingKey` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoutingKey {
    type Err = ParseRoutingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseRoutingKeyError(
                "Routing key cannot be empty".to_string(),
            ));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(ParseRoutingKeyError(format!(
                "Routing key cannot contain whitespace: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for RoutingKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoutingKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
