//! Fetcher for GREIN-hosted GEO RNA-seq datasets.
//!
//! Two HTTP calls per dataset: the metadata document and the raw count
//! matrix. Every call runs under a deadline and is retried with a linear
//! backoff before the load is promoted to failed.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::{ExternalData, Parameter, SampleMetadata};
use gsa_common::{GsaError, Result};

use super::{DatasetFetcher, FetchedDataset};

const FETCH_ATTEMPTS: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct GreinSample {
    id: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct GreinMetadata {
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    species: Option<String>,
    #[serde(default)]
    samples: Vec<GreinSample>,
}

pub struct GreinFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl GreinFetcher {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    last_error = Some(format!("server returned {}", response.status()));
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                }
            }

            if attempt < FETCH_ATTEMPTS {
                tracing::warn!(url, attempt, "GREIN request failed, retrying");
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
            }
        }

        Err(GsaError::DataSource(format!(
            "Failed to load dataset from GREIN: {}",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    /// Restrict matrix and metadata to the first `max_samples` samples
    fn truncate(matrix: ExpressionMatrix, max_samples: usize) -> ExpressionMatrix {
        if max_samples == 0 || max_samples >= matrix.n_samples() {
            return matrix;
        }
        let values = (0..matrix.n_rows())
            .map(|row| matrix.row(row)[..max_samples].to_vec())
            .collect();
        ExpressionMatrix::from_parts(
            matrix.identifiers().to_vec(),
            matrix.samples()[..max_samples].to_vec(),
            values,
        )
    }
}

#[async_trait]
impl DatasetFetcher for GreinFetcher {
    fn source(&self) -> &'static str {
        "grein"
    }

    fn accepts(&self, resource_id: &str) -> bool {
        resource_id.starts_with("GSE")
    }

    async fn fetch(
        &self,
        resource_id: &str,
        parameters: &[Parameter],
    ) -> Result<FetchedDataset> {
        let metadata_url = format!("{}/datasets/{}/metadata", self.base_url, resource_id);
        let metadata: GreinMetadata = self
            .get_with_retry(&metadata_url)
            .await?
            .json()
            .await
            .map_err(|e| {
                GsaError::DataSource(format!("GREIN metadata for {} is malformed: {}", resource_id, e))
            })?;

        let counts_url = format!("{}/datasets/{}/counts", self.base_url, resource_id);
        let counts = self
            .get_with_retry(&counts_url)
            .await?
            .text()
            .await
            .map_err(|e| {
                GsaError::DataSource(format!("GREIN counts for {} are unreadable: {}", resource_id, e))
            })?;

        let matrix = ExpressionMatrix::parse(&counts).map_err(|e| {
            GsaError::DataSource(format!(
                "GREIN counts for {} are not a valid expression matrix: {}",
                resource_id, e
            ))
        })?;

        let max_samples = parameters
            .iter()
            .find(|p| p.name == "max_samples")
            .and_then(|p| p.value.parse::<usize>().ok())
            .unwrap_or(0);
        let matrix = Self::truncate(matrix, max_samples);

        // Pivot the per-sample metadata maps into parallel columns
        let sample_ids: Vec<String> = matrix.samples().to_vec();
        let mut keys: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for sample in &metadata.samples {
            keys.extend(sample.metadata.keys().cloned());
        }

        let sample_metadata: Vec<SampleMetadata> = keys
            .into_iter()
            .map(|key| {
                let values = sample_ids
                    .iter()
                    .map(|sample_id| {
                        metadata
                            .samples
                            .iter()
                            .find(|sample| &sample.id == sample_id)
                            .and_then(|sample| sample.metadata.get(&key))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect();
                SampleMetadata { name: key, values }
            })
            .collect();

        let mut description = metadata.summary.clone().unwrap_or_default();
        if let Some(species) = &metadata.species {
            if !description.is_empty() {
                description.push_str(" - ");
            }
            description.push_str(species);
        }

        let summary = ExternalData {
            id: resource_id.to_string(),
            title: metadata.title,
            data_type: "rnaseq_counts".to_string(),
            description: (!description.is_empty()).then_some(description),
            group: Some("grein".to_string()),
            sample_ids,
            sample_metadata,
            default_parameters: vec![],
        };

        Ok(FetchedDataset {
            data: matrix.to_tsv(),
            summary,
        })
    }
}
