//! Dataset loader configuration.

use anyhow::Result;
use std::path::PathBuf;

use gsa_common::config::BackendConfig;

/// Default directory holding the example datasets.
pub const DEFAULT_EXAMPLE_DIRECTORY: &str = "/data/examples";

/// Full configuration of the dataset loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub backend: BackendConfig,
    /// Directory with `{id}.data` / `{id}.summary` example pairs
    pub example_directory: PathBuf,
    /// GREIN API endpoint; the GREIN fetcher is disabled when unset
    pub grein_base_url: Option<String>,
}

impl LoaderConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            backend: BackendConfig::from_env()?,
            example_directory: std::env::var("EXAMPLE_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_EXAMPLE_DIRECTORY)),
            grein_base_url: std::env::var("GREIN_BASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
        })
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            example_directory: PathBuf::from(DEFAULT_EXAMPLE_DIRECTORY),
            grein_base_url: None,
        }
    }
}
