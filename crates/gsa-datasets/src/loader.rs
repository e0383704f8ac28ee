//! The dataset loading loop.
//!
//! Loading runs through `queued -> fetching -> converting -> indexing ->
//! complete`, reporting each stage through the status record. The loading
//! job id and the produced dataset id are distinct: loading is a task,
//! the dataset is the artifact. Loads of the same resource and parameters
//! within the dataset TTL short-circuit to the cached dataset id.

use sha2::{Digest, Sha256};
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use gsa_common::blackboard::{keys, Blackboard};
use gsa_common::broker::{Broker, BrokerRef, Delivery, Queue};
use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::{DatasetJob, JobKind, Parameter};
use gsa_common::notify::{alert_operator, NotifierRef};
use gsa_common::registry::JobRegistry;
use gsa_common::{GsaError, Result};

use crate::config::LoaderConfig;
use crate::fetchers::FetcherRegistry;

/// Derive the stable dataset id for a resource and parameter set
pub fn dataset_id_for(resource_id: &str, parameters: &[Parameter]) -> String {
    let mut sorted: Vec<&Parameter> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    hasher.update(resource_id.as_bytes());
    for parameter in sorted {
        hasher.update(b"\x1f");
        hasher.update(parameter.name.as_bytes());
        hasher.update(b"=");
        hasher.update(parameter.value.as_bytes());
    }

    let digest = hasher.finalize();
    let mut id = String::from("dst_");
    for byte in digest.iter().take(6) {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}

pub struct DatasetLoader {
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
    config: Arc<LoaderConfig>,
    notifier: NotifierRef,
    fetchers: FetcherRegistry,
}

impl DatasetLoader {
    pub fn new(
        broker: BrokerRef,
        registry: Arc<JobRegistry>,
        config: Arc<LoaderConfig>,
        notifier: NotifierRef,
    ) -> Self {
        let fetchers = FetcherRegistry::from_config(&config);
        Self {
            broker,
            registry,
            config,
            notifier,
            fetchers,
        }
    }

    /// Blocking consume loop; exits only with the process
    pub async fn run(&self) {
        tracing::info!("Listening for dataset loading messages");
        loop {
            match self.broker.consume(Queue::Dataset).await {
                Ok(delivery) => self.handle_delivery(delivery).await,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to consume dataset message");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub async fn handle_delivery(&self, delivery: Delivery) {
        let job: DatasetJob = match serde_json::from_slice(&delivery.payload) {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(error = %err, "Failed to decode dataset message");
                self.settle(&delivery, true).await;
                return;
            }
        };

        tracing::info!(
            loading_id = %job.loading_id,
            resource_id = %job.resource_id,
            "Received dataset loading request"
        );

        match self.registry.get_status(JobKind::Dataset, &job.loading_id).await {
            Ok(Some(status)) if status.state.is_terminal() => {
                self.settle(&delivery, true).await;
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                if self
                    .registry
                    .seed(JobKind::Dataset, &job.loading_id, "Queued")
                    .await
                    .is_err()
                {
                    self.settle(&delivery, false).await;
                    return;
                }
            }
            Err(_) => {
                self.settle(&delivery, false).await;
                return;
            }
        }

        match self.process(&job).await {
            Ok(()) => self.settle(&delivery, true).await,
            Err(err) if err.is_deterministic() => {
                tracing::warn!(loading_id = %job.loading_id, error = %err, "Dataset loading failed");
                let _ = self
                    .registry
                    .fail(
                        JobKind::Dataset,
                        &job.loading_id,
                        &format!("Failed to load dataset: {}", err.user_message()),
                    )
                    .await;
                alert_operator(&*self.notifier, &job.loading_id, &err.to_string()).await;
                self.settle(&delivery, true).await;
            }
            Err(err) => {
                tracing::error!(loading_id = %job.loading_id, error = %err, "Dataset loading interrupted");
                self.settle(&delivery, false).await;
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, ack: bool) {
        let outcome = if ack {
            self.broker.ack(delivery).await
        } else {
            self.broker.nack(delivery).await
        };
        if let Err(err) = outcome {
            tracing::error!(error = %err, "Failed to settle delivery");
        }
    }

    async fn process(&self, job: &DatasetJob) -> Result<()> {
        let loading_id = &job.loading_id;
        let dataset_id = dataset_id_for(&job.resource_id, &job.parameters);
        let board = self.registry.blackboard();

        // Idempotent short-circuit on a cached load
        if board.exists(&keys::dataset(&dataset_id)).await?
            && board.exists(&keys::dataset_data(&dataset_id)).await?
        {
            tracing::debug!(dataset_id = %dataset_id, "Serving dataset from cache");
            self.registry
                .complete_dataset(
                    loading_id,
                    &format!("Dataset {} available.", dataset_id),
                    &dataset_id,
                )
                .await?;
            return Ok(());
        }

        self.registry
            .update_progress(
                JobKind::Dataset,
                loading_id,
                0.1,
                &format!("Dataset {} is being loaded", job.resource_id),
            )
            .await?;

        let fetcher = self.fetchers.fetcher_for(&job.resource_id).ok_or_else(|| {
            GsaError::DataSource(format!(
                "Failed to resolve identifier '{}'.",
                job.resource_id
            ))
        })?;
        let fetched = fetcher.fetch(&job.resource_id, &job.parameters).await?;

        self.registry
            .update_progress(
                JobKind::Dataset,
                loading_id,
                0.6,
                &format!("Converting dataset {}", job.resource_id),
            )
            .await?;
        let matrix = ExpressionMatrix::parse(&fetched.data).map_err(|err| {
            GsaError::DataSource(format!(
                "Dataset {} is not a valid expression table: {}",
                job.resource_id, err
            ))
        })?;

        self.registry
            .update_progress(
                JobKind::Dataset,
                loading_id,
                0.8,
                &format!("Indexing dataset {}", job.resource_id),
            )
            .await?;

        let mut summary = fetched.summary;
        summary.id = dataset_id.clone();
        if summary.sample_ids.is_empty() {
            summary.sample_ids = matrix.samples().to_vec();
        }
        if summary.group.is_none() {
            summary.group = Some(fetcher.source().to_string());
        }

        let ttl = Some(self.config.backend.dataset_ttl);
        board
            .put(
                &keys::dataset(&dataset_id),
                &serde_json::to_vec(&summary)?,
                ttl,
            )
            .await?;
        board
            .put(
                &keys::dataset_data(&dataset_id),
                matrix.to_tsv().as_bytes(),
                ttl,
            )
            .await?;

        self.registry
            .complete_dataset(
                loading_id,
                &format!("Dataset {} available.", dataset_id),
                &dataset_id,
            )
            .await?;

        tracing::info!(
            loading_id = %loading_id,
            dataset_id = %dataset_id,
            rows = matrix.n_rows(),
            samples = matrix.n_samples(),
            "Dataset loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_is_stable_and_parameter_order_free() {
        let a = dataset_id_for(
            "GSE100001",
            &[
                Parameter::new("max_samples", "10"),
                Parameter::new("species", "human"),
            ],
        );
        let b = dataset_id_for(
            "GSE100001",
            &[
                Parameter::new("species", "human"),
                Parameter::new("max_samples", "10"),
            ],
        );
        assert_eq!(a, b);
        assert!(a.starts_with("dst_"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_dataset_id_varies_with_inputs() {
        let base = dataset_id_for("GSE100001", &[]);
        assert_ne!(base, dataset_id_for("GSE100002", &[]));
        assert_ne!(
            base,
            dataset_id_for("GSE100001", &[Parameter::new("max_samples", "5")])
        );
    }
}
