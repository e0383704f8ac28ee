//! Fetcher for the curated example datasets.
//!
//! Examples live on disk as `{id}.data` (tab-delimited matrix) and
//! `{id}.summary` (JSON-encoded summary) pairs.

use async_trait::async_trait;
use std::path::PathBuf;

use gsa_common::models::{ExternalData, Parameter};
use gsa_common::{GsaError, Result};

use super::{DatasetFetcher, FetchedDataset};

pub struct ExampleFetcher {
    directory: PathBuf,
}

impl ExampleFetcher {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Keep resource ids from escaping the example directory
    fn sanitize(identifier: &str) -> String {
        identifier
            .replace('/', "_")
            .replace('.', "_")
            .replace('$', "_")
    }
}

#[async_trait]
impl DatasetFetcher for ExampleFetcher {
    fn source(&self) -> &'static str {
        "example"
    }

    fn accepts(&self, resource_id: &str) -> bool {
        resource_id.starts_with("EXAMPLE_")
    }

    async fn fetch(
        &self,
        resource_id: &str,
        _parameters: &[Parameter],
    ) -> Result<FetchedDataset> {
        let identifier = Self::sanitize(resource_id);
        let data_file = self.directory.join(format!("{}.data", identifier));
        let summary_file = self.directory.join(format!("{}.summary", identifier));

        if !data_file.is_file() || !summary_file.is_file() {
            return Err(GsaError::DataSource(format!(
                "Unknown example data identifier {}",
                resource_id
            )));
        }

        let data = tokio::fs::read_to_string(&data_file).await.map_err(|_| {
            GsaError::DataSource(format!("Failed to load data for {}", resource_id))
        })?;
        let raw_summary = tokio::fs::read_to_string(&summary_file).await.map_err(|_| {
            GsaError::DataSource(format!("Failed to load summary data for {}", resource_id))
        })?;

        let summary: ExternalData = serde_json::from_str(&raw_summary).map_err(|_| {
            GsaError::DataSource(format!("Failed to load a valid summary for {}", resource_id))
        })?;

        Ok(FetchedDataset { data, summary })
    }
}
