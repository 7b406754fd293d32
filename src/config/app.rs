//! Application configuration loading.
//!
//! Settings come from a TOML file (default `config.toml`, overridable with the
//! `PETRO_CONFIG` environment variable). Every field has a default so a missing
//! file is not an error. A handful of deployment values can be overridden from
//! the environment (`DATABASE_URL`, `BIND_ADDR`, `CRON_SECRET`), which `main`
//! populates from `.env` via `dotenvy`.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// In-process cron settings
    pub scheduler: SchedulerConfig,
    /// Bearer token required by `/api/cron/*` when set
    pub cron_secret: Option<String>,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL (`mysql://...` in production, `sqlite://...` for local runs)
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// How many times to retry when the server refuses connections
    pub connect_retries: u32,
    /// Fixed wait between retries
    pub retry_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mysql://root@localhost:3306/petro".to_string(),
            max_connections: 10,
            connect_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

/// Cron expressions (six fields, seconds first) for the lifecycle jobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the jobs inside the server process
    pub enabled: bool,
    /// How often the scheduler wakes up to check for due jobs
    pub tick_seconds: u64,
    /// Deal price activation/expiry
    pub deal_prices: String,
    /// Credit line expiry reset
    pub limit_expiry: String,
    /// Daily ceiling restore
    pub day_limit_reset: String,
    /// Overdue invoice enforcement
    pub credit_days: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_seconds: 30,
            deal_prices: "0 * * * * *".to_string(),
            limit_expiry: "0 0 * * * *".to_string(),
            day_limit_reset: "0 0 0 * * *".to_string(),
            credit_days: "0 30 0 * * *".to_string(),
        }
    }
}

impl AppConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse configuration: {e}"),
        })
    }

    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored so `CRON_SECRET=` does not enable an empty secret.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(addr) = non_empty("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(secret) = non_empty("CRON_SECRET") {
            self.cron_secret = Some(secret);
        }
    }
}

/// Loads configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.as_ref().display()),
    })?;
    AppConfig::from_toml_str(&contents)
}

/// Loads the file named by `PETRO_CONFIG` (or `config.toml`), falling back to
/// defaults when it does not exist, then applies environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("PETRO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = if Path::new(&path).exists() {
        debug!("Loading configuration from {}", path);
        load_config(&path)?
    } else {
        info!("No configuration file at {}, using defaults", path);
        AppConfig::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let toml_str = r#"
            cron_secret = "s3cret"

            [server]
            bind_addr = "127.0.0.1:8080"

            [scheduler]
            enabled = false
        "#;

        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.cron_secret.as_deref(), Some("s3cret"));
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.deal_prices, "0 * * * * *");
        assert_eq!(config.database.connect_retries, 3);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = AppConfig::from_toml_str("[server\nbind_addr = 1");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "sqlite::memory:"),
            ("CRON_SECRET", "  "),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert!(config.cron_secret.is_none());
    }
}
