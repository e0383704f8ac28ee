//! Backend configuration shared by every service role.
//!
//! All services talk to the same blackboard and broker endpoints, so the
//! environment surface lives here; service-specific settings stay in the
//! service crates.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::blackboard::{BlackboardRef, MemoryBlackboard, RedisBlackboard};
use crate::broker::{BrokerRef, BrokerSettings, MemoryBroker, RedisBroker};
use crate::secrets::env_or_secret_file;

/// Default per-queue length ceiling
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 10;

/// Default per-message delivery limit
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 3;

/// Default publish attempts at admission
pub const DEFAULT_MAX_MESSAGE_TRIES: u32 = 3;

/// Default retention of status records (7 days)
pub const DEFAULT_STATUS_TTL_SECS: u64 = 7 * 24 * 3600;

/// Default retention of result blobs (7 days)
pub const DEFAULT_RESULT_TTL_SECS: u64 = 7 * 24 * 3600;

/// Default retention of loaded datasets (6 hours)
pub const DEFAULT_DATASET_TTL_SECS: u64 = 6 * 3600;

/// Read an environment variable, parsing into `T`, with a default
pub fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Connection and limit settings for the blackboard and broker
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Redis endpoint; `None` selects the in-memory backends
    /// (single-process standalone mode)
    pub redis_url: Option<String>,
    pub broker: BrokerSettings,
    pub max_message_tries: u32,
    pub status_ttl: Duration,
    pub result_ttl: Duration,
    pub dataset_ttl: Duration,
}

impl BackendConfig {
    /// Load from the environment.
    ///
    /// `REDIS_URL` wins; otherwise a URL is composed from `REDIS_HOST`,
    /// `REDIS_PORT`, `REDIS_DATABASE` and `REDIS_PASSWORD` /
    /// `REDIS_PASSWORD_FILE`. With neither set the in-memory backends are
    /// used.
    pub fn from_env() -> Result<Self> {
        let redis_url = match std::env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => Some(url),
            _ => std::env::var("REDIS_HOST").ok().map(|host| {
                let port: u16 = env_parse("REDIS_PORT", 6379);
                let database: u32 = env_parse("REDIS_DATABASE", 0);
                match env_or_secret_file("REDIS_PASSWORD") {
                    Some(password) => {
                        format!("redis://:{}@{}:{}/{}", password, host, port, database)
                    }
                    None => format!("redis://{}:{}/{}", host, port, database),
                }
            }),
        };

        let config = Self {
            redis_url,
            broker: BrokerSettings {
                max_queue_length: env_parse("MAX_QUEUE_LENGTH", DEFAULT_MAX_QUEUE_LENGTH),
                max_delivery_count: env_parse("MAX_DELIVERY_COUNT", DEFAULT_MAX_DELIVERY_COUNT),
            },
            max_message_tries: env_parse("MAX_MESSAGE_TRIES", DEFAULT_MAX_MESSAGE_TRIES),
            status_ttl: Duration::from_secs(env_parse("STATUS_TTL_SECS", DEFAULT_STATUS_TTL_SECS)),
            result_ttl: Duration::from_secs(env_parse("RESULT_TTL_SECS", DEFAULT_RESULT_TTL_SECS)),
            dataset_ttl: Duration::from_secs(env_parse(
                "DATASET_TTL_SECS",
                DEFAULT_DATASET_TTL_SECS,
            )),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.max_queue_length == 0 {
            anyhow::bail!("MAX_QUEUE_LENGTH must be greater than 0");
        }
        if self.broker.max_delivery_count == 0 {
            anyhow::bail!("MAX_DELIVERY_COUNT must be greater than 0");
        }
        if self.max_message_tries == 0 {
            anyhow::bail!("MAX_MESSAGE_TRIES must be greater than 0");
        }
        Ok(())
    }

    /// Connect the blackboard backend selected by this configuration
    pub async fn connect_blackboard(&self) -> Result<BlackboardRef> {
        match &self.redis_url {
            Some(url) => {
                let board = RedisBlackboard::connect(url).await?;
                tracing::info!("Connected to Redis blackboard");
                Ok(Arc::new(board))
            }
            None => {
                tracing::warn!(
                    "No Redis endpoint configured, using in-memory blackboard (standalone mode)"
                );
                Ok(Arc::new(MemoryBlackboard::new()))
            }
        }
    }

    /// Connect the broker backend selected by this configuration
    pub async fn connect_broker(&self) -> Result<BrokerRef> {
        match &self.redis_url {
            Some(url) => {
                let broker = RedisBroker::connect(url, self.broker).await?;
                tracing::info!("Connected to Redis broker");
                Ok(Arc::new(broker))
            }
            None => {
                tracing::warn!(
                    "No Redis endpoint configured, using in-memory broker (standalone mode)"
                );
                Ok(Arc::new(MemoryBroker::new(self.broker)))
            }
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            broker: BrokerSettings::default(),
            max_message_tries: DEFAULT_MAX_MESSAGE_TRIES,
            status_ttl: Duration::from_secs(DEFAULT_STATUS_TTL_SECS),
            result_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_SECS),
            dataset_ttl: Duration::from_secs(DEFAULT_DATASET_TTL_SECS),
        }
    }
}

/// Block until SIGTERM or ctrl-c; shared by every service binary
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BackendConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_queue_length_is_invalid() {
        let mut config = BackendConfig::default();
        config.broker.max_queue_length = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_standalone_backends_connect() {
        let config = BackendConfig::default();
        assert!(config.connect_blackboard().await.is_ok());
        assert!(config.connect_broker().await.is_ok());
    }
}
