//! API service configuration.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use gsa_common::config::{env_parse, BackendConfig};

/// Default server host binding.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default worker stall timeout in seconds.
pub const DEFAULT_MAX_WORKER_TIMEOUT_SECS: u64 = 60;

/// Default dataset loading stall timeout in seconds.
pub const DEFAULT_LOADING_MAX_TIMEOUT_SECS: u64 = 300;

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default public base URL used in artifact links.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Full configuration of the API service
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    /// Promote silent running analysis/report jobs to failed after this
    pub max_worker_timeout: Duration,
    /// Promote silent dataset loading jobs to failed after this
    pub loading_max_timeout: Duration,
    pub sweep_interval: Duration,
    /// Directory holding `{id}.data` / `{id}.summary` example datasets
    pub example_directory: Option<PathBuf>,
    pub search_whitelist: Option<PathBuf>,
    pub search_blacklist: Option<PathBuf>,
    /// Public base URL, used when composing artifact links
    pub base_url: String,
}

impl ApiConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig {
                host: std::env::var("GSA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
                port: env_parse("GSA_PORT", DEFAULT_PORT),
                shutdown_timeout_secs: env_parse(
                    "GSA_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            backend: BackendConfig::from_env()?,
            max_worker_timeout: Duration::from_secs(env_parse(
                "MAX_WORKER_TIMEOUT",
                DEFAULT_MAX_WORKER_TIMEOUT_SECS,
            )),
            loading_max_timeout: Duration::from_secs(env_parse(
                "LOADING_MAX_TIMEOUT",
                DEFAULT_LOADING_MAX_TIMEOUT_SECS,
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            example_directory: std::env::var("EXAMPLE_DIRECTORY").ok().map(PathBuf::from),
            search_whitelist: std::env::var("SEARCH_WHITELIST").ok().map(PathBuf::from),
            search_blacklist: std::env::var("SEARCH_BLACKLIST").ok().map(PathBuf::from),
            base_url: std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }
        if self.max_worker_timeout.is_zero() || self.loading_max_timeout.is_zero() {
            anyhow::bail!("Stall timeouts must be greater than 0");
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            backend: BackendConfig::default(),
            max_worker_timeout: Duration::from_secs(DEFAULT_MAX_WORKER_TIMEOUT_SECS),
            loading_max_timeout: Duration::from_secs(DEFAULT_LOADING_MAX_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            example_directory: None,
            search_whitelist: None,
            search_blacklist: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ApiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ApiConfig::default();
        config.max_worker_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
