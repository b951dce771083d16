//! Configuration loading and representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_observability::LogFormat;

pub const ENV_DATABASE_URL: &str = "STOCKLEDGER_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "STOCKLEDGER_MAX_CONNECTIONS";
pub const ENV_LOG_FORMAT: &str = "STOCKLEDGER_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "STOCKLEDGER_LOG_LEVEL";
pub const ENV_ALLOW_SELF_TRANSFER: &str = "STOCKLEDGER_ALLOW_SELF_TRANSFER";
pub const ENV_COMMIT_RETRIES: &str = "STOCKLEDGER_COMMIT_RETRIES";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Ledger runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Postgres URL. `None` selects the in-memory backend.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_format: LogFormat,
    pub log_level: String,
    /// Permit transfers whose source and destination are the same warehouse.
    pub allow_self_transfer: bool,
    /// Extra attempts for a transfer commit that hit a write conflict.
    pub commit_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            allow_self_transfer: false,
            commit_retries: 3,
        }
    }
}

impl LedgerConfig {
    /// Load from process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            config.database_url = Some(url);
        }
        if let Some(v) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = match v.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid(ENV_MAX_CONNECTIONS, v, "expected a positive integer")),
            };
        }
        if let Some(v) = lookup(ENV_LOG_FORMAT) {
            config.log_format = LogFormat::parse(&v)
                .ok_or_else(|| invalid(ENV_LOG_FORMAT, v.clone(), "expected json or pretty"))?;
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            config.log_level = v;
        }
        if let Some(v) = lookup(ENV_ALLOW_SELF_TRANSFER) {
            config.allow_self_transfer = parse_bool(&v)
                .ok_or_else(|| invalid(ENV_ALLOW_SELF_TRANSFER, v.clone(), "expected true or false"))?;
        }
        if let Some(v) = lookup(ENV_COMMIT_RETRIES) {
            config.commit_retries = v
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(ENV_COMMIT_RETRIES, v.clone(), "expected a non-negative integer"))?;
        }

        Ok(config)
    }

    pub fn uses_postgres(&self) -> bool {
        self.database_url.is_some()
    }
}

fn invalid(key: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { key, value, reason }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
