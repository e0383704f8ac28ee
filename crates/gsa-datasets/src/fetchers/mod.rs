//! Dataset fetchers.
//!
//! Each fetcher serves one family of resource identifiers and returns the
//! dataset in the system's tabular form together with its summary record.

mod example;
mod grein;

use async_trait::async_trait;
use std::sync::Arc;

use gsa_common::models::{ExternalData, Parameter};
use gsa_common::Result;

use crate::config::LoaderConfig;

pub use example::ExampleFetcher;
pub use grein::GreinFetcher;

/// A fetched dataset: tab-delimited matrix plus its summary
#[derive(Debug, Clone)]
pub struct FetchedDataset {
    pub data: String,
    pub summary: ExternalData,
}

/// Capability of loading one family of external datasets
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    /// Data source group this fetcher serves, e.g. "example" or "grein"
    fn source(&self) -> &'static str;

    /// Whether this fetcher can resolve the given resource id
    fn accepts(&self, resource_id: &str) -> bool;

    /// Fetch and normalize the dataset
    async fn fetch(
        &self,
        resource_id: &str,
        parameters: &[Parameter],
    ) -> Result<FetchedDataset>;
}

/// All configured fetchers, looked up by resource id
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn DatasetFetcher>>,
}

impl FetcherRegistry {
    pub fn from_config(config: &LoaderConfig) -> Self {
        let mut fetchers: Vec<Arc<dyn DatasetFetcher>> =
            vec![Arc::new(ExampleFetcher::new(config.example_directory.clone()))];

        match &config.grein_base_url {
            Some(url) => fetchers.push(Arc::new(GreinFetcher::new(url.clone()))),
            None => tracing::info!("GREIN fetcher disabled (GREIN_BASE_URL unset)"),
        }

        Self { fetchers }
    }

    pub fn fetcher_for(&self, resource_id: &str) -> Option<Arc<dyn DatasetFetcher>> {
        self.fetchers
            .iter()
            .find(|fetcher| fetcher.accepts(resource_id))
            .cloned()
    }
}
