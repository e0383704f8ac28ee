//! Analysis worker configuration.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use gsa_common::config::{env_parse, BackendConfig};

/// Default pathway database release identifier.
pub const DEFAULT_PATHWAY_RELEASE: &str = "70";

/// Default minimum interval between progress writes in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1000;

/// Default minimum number of mapped identifiers for a reliable analysis.
pub const DEFAULT_MIN_MAPPED_IDENTIFIERS: usize = 10;

/// Full configuration of the analysis worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub backend: BackendConfig,
    /// Pathway database release reported in every result
    pub pathway_release: String,
    /// Directory holding the pathway gene set files; the built-in sample
    /// set is used when unset
    pub pathway_directory: Option<PathBuf>,
    /// Identifier mapping service endpoint; identity mapping when unset
    pub mapping_service_url: Option<String>,
    /// Rate limit for progress writes to the blackboard
    pub progress_interval: Duration,
    /// Analyses mapping fewer identifiers than this fail
    pub min_mapped_identifiers: usize,
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            backend: BackendConfig::from_env()?,
            pathway_release: std::env::var("PATHWAY_RELEASE")
                .unwrap_or_else(|_| DEFAULT_PATHWAY_RELEASE.to_string()),
            pathway_directory: std::env::var("PATHWAY_DIRECTORY").ok().map(PathBuf::from),
            mapping_service_url: std::env::var("MAPPING_SERVICE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            progress_interval: Duration::from_millis(env_parse(
                "PROGRESS_UPDATE_INTERVAL_MS",
                DEFAULT_PROGRESS_INTERVAL_MS,
            )),
            min_mapped_identifiers: env_parse(
                "MIN_MAPPED_IDENTIFIERS",
                DEFAULT_MIN_MAPPED_IDENTIFIERS,
            ),
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            pathway_release: DEFAULT_PATHWAY_RELEASE.to_string(),
            pathway_directory: None,
            mapping_service_url: None,
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            min_mapped_identifiers: DEFAULT_MIN_MAPPED_IDENTIFIERS,
        }
    }
}
