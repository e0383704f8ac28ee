//! Report generator configuration.

use anyhow::Result;

use gsa_common::config::BackendConfig;

/// Default public base URL used in artifact links.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default sender address for result notifications.
pub const DEFAULT_FROM_ADDRESS: &str = "no-reply@gsa.example.org";

/// Full configuration of the report generator
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub backend: BackendConfig,
    /// Public base URL the artifact links point at
    pub base_url: String,
    /// Sender address on result notifications
    pub from_address: String,
}

impl ReportConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            backend: BackendConfig::from_env()?,
            base_url: std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            from_address: std::env::var("FROM_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
        })
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
        }
    }
}
