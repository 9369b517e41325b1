//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{AccountId, Currency};
use crate::ledger::EngineConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Upper bound on waiting for an account lock
    pub lock_timeout: Duration,

    /// Fresh attempts after a serialization conflict
    pub max_retries: u32,

    /// Linear backoff step between attempts
    pub retry_backoff: Duration,

    /// Internal cash account; generated at startup when absent
    pub cash_account_id: Option<AccountId>,

    /// Currency of the cash account
    pub cash_currency: Currency,
}

/// Parse an optional variable, falling back to `default` when unset
fn var_or<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let database_max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = var_or("PORT", "3000")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let lock_timeout = Duration::from_millis(var_or("LOCK_TIMEOUT_MS", "5000")?);

        let max_retries = var_or("MAX_RETRIES", "3")?;

        let retry_backoff = Duration::from_millis(var_or("RETRY_BACKOFF_MS", "50")?);

        let cash_account_id = match env::var("CASH_ACCOUNT_ID") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("CASH_ACCOUNT_ID"))?,
            ),
            Err(_) => None,
        };

        let cash_currency = var_or("CASH_CURRENCY", "USD")?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            lock_timeout,
            max_retries,
            retry_backoff,
            cash_account_id,
            cash_currency,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Retry policy handed to the ledger engine
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
