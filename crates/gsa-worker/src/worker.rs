//! The analysis worker: one message at a time, manual acknowledgement.
//!
//! Deterministic failures (bad data, failing kernels) mark the job as
//! failed and acknowledge the message; infrastructure failures leave the
//! message unacknowledged so the broker redelivers it up to its limit.

use std::collections::BTreeSet;
use std::sync::Arc;

use gsa_common::blackboard::{keys, Blackboard};
use gsa_common::broker::{publish_with_retry, Broker, BrokerRef, Delivery, Queue};
use gsa_common::models::{
    AnalysisJob, AnalysisResult, ArtifactKind, DatasetResult, IdentifierMapping, JobKind,
    ReportJob,
};
use gsa_common::notify::{alert_operator, NotifierRef};
use gsa_common::registry::JobRegistry;
use gsa_common::{GsaError, Result};

use crate::config::WorkerConfig;
use crate::conversion;
use crate::genesets::{pathway_file, GeneSet, GeneSetMapping};
use crate::kernel::{kernel_for_method, KernelOptions, NormalizationConfig};
use crate::mapping::IdentifierMapper;
use crate::progress::start_progress_channel;

pub struct AnalysisWorker {
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
    config: Arc<WorkerConfig>,
    notifier: NotifierRef,
    mapper: IdentifierMapper,
}

impl AnalysisWorker {
    pub fn new(
        broker: BrokerRef,
        registry: Arc<JobRegistry>,
        config: Arc<WorkerConfig>,
        notifier: NotifierRef,
    ) -> Result<Self> {
        let mapper = IdentifierMapper::new(
            config.mapping_service_url.clone(),
            config.min_mapped_identifiers,
        )?;
        Ok(Self {
            broker,
            registry,
            config,
            notifier,
            mapper,
        })
    }

    /// Blocking consume loop; exits only with the process
    pub async fn run(&self) {
        tracing::info!("Listening for analysis messages");
        loop {
            match self.broker.consume(Queue::Analysis).await {
                Ok(delivery) => self.handle_delivery(delivery).await,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to consume analysis message");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Process one delivery and settle it (ack or nack)
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let job: AnalysisJob = match serde_json::from_slice(&delivery.payload) {
            Ok(job) => job,
            Err(err) => {
                // A message the API could not have produced; drop it
                tracing::error!(error = %err, "Failed to decode analysis message");
                self.settle(&delivery, true).await;
                return;
            }
        };

        tracing::info!(
            job_id = %job.job_id,
            method = %job.input.method_name,
            delivery_count = delivery.delivery_count,
            "Received analysis request"
        );

        // A redelivery for a job that already finished is dropped
        match self.registry.get_status(JobKind::Analysis, &job.job_id).await {
            Ok(Some(status)) if status.state.is_terminal() => {
                tracing::debug!(job_id = %job.job_id, "Dropping stale retry for terminal job");
                self.settle(&delivery, true).await;
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                // The record expired or was evicted; recreate it
                if let Err(err) = self
                    .registry
                    .seed(JobKind::Analysis, &job.job_id, "Queued")
                    .await
                {
                    tracing::error!(job_id = %job.job_id, error = %err, "Cannot recreate status");
                    self.settle(&delivery, false).await;
                    return;
                }
            }
            Err(err) => {
                tracing::error!(job_id = %job.job_id, error = %err, "Cannot read job status");
                self.settle(&delivery, false).await;
                return;
            }
        }

        match self.process_job(&job).await {
            Ok(()) => {
                tracing::info!(job_id = %job.job_id, "Analysis complete");
                self.settle(&delivery, true).await;
            }
            Err(err) if err.is_deterministic() => {
                tracing::warn!(job_id = %job.job_id, error = %err, "Analysis failed");
                let _ = self
                    .registry
                    .fail(JobKind::Analysis, &job.job_id, &err.user_message())
                    .await;
                if !matches!(err, GsaError::Validation(_)) {
                    alert_operator(&*self.notifier, &job.job_id, &err.to_string()).await;
                }
                self.settle(&delivery, true).await;
            }
            Err(err) => {
                // Infrastructure trouble: leave the job to redelivery
                tracing::error!(job_id = %job.job_id, error = %err, "Analysis interrupted");
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

    async fn process_job(&self, job: &AnalysisJob) -> Result<()> {
        let job_id = &job.job_id;
        let input = &job.input;

        self.registry
            .update_progress(JobKind::Analysis, job_id, 0.01, "Starting analysis")
            .await?;

        let kernel = kernel_for_method(&input.method_name).ok_or_else(|| {
            GsaError::Validation(format!(
                "Unsupported method '{}' selected",
                input.method_name
            ))
        })?;

        if input.datasets.is_empty() {
            return Err(GsaError::Validation(
                "Request did not contain any datasets".to_string(),
            ));
        }

        let mut datasets = input.datasets.clone();
        if !kernel.uses_design() {
            for dataset in &mut datasets {
                dataset.design = None;
            }
        }

        // Decode every matrix (including the Ribo-seq collapse)
        let mut matrices = Vec::with_capacity(datasets.len());
        for dataset in &datasets {
            self.registry
                .update_progress(
                    JobKind::Analysis,
                    job_id,
                    0.05,
                    &format!("Converting dataset {}...", dataset.name),
                )
                .await?;
            let matrix = conversion::convert_dataset(dataset)?;
            conversion::validate_design(dataset, &matrix)?;
            matrices.push(matrix);
        }

        self.registry
            .update_progress(JobKind::Analysis, job_id, 0.1, "Mapping identifiers...")
            .await?;
        let identifiers: Vec<String> = matrices
            .iter()
            .flat_map(|matrix| matrix.identifiers().iter().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let identifier_mappings = self.mapper.map_identifiers(&identifiers).await?;

        let use_interactors = flag(input.parameter("use_interactors"), false);
        let include_disease = flag(input.parameter("include_disease_pathways"), true);
        let gene_set = self.load_gene_set(use_interactors, include_disease)?;

        // Filter rows and resolve pathway membership per dataset
        let mut units = Vec::with_capacity(datasets.len());
        for (dataset, matrix) in datasets.iter().zip(&matrices) {
            let max_missing = dataset
                .parameter("max_missing_values")
                .or_else(|| input.parameter("max_missing_values"))
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(0.5);

            let filtered = conversion::filter_matrix(
                &dataset.name,
                matrix,
                dataset.design.as_ref(),
                &identifier_mappings,
                max_missing,
            )?;
            let mapping =
                GeneSetMapping::create(&gene_set, filtered.identifiers(), &identifier_mappings);
            units.push((dataset, filtered, mapping));
        }

        let (progress, drain) = start_progress_channel(
            self.registry.clone(),
            JobKind::Analysis,
            job_id.clone(),
            self.config.progress_interval,
        );
        progress.update(
            0.2,
            &format!("Performing gene set analysis using {}", input.method_name),
        );

        let options = KernelOptions::from_input(input);
        let kernel_window = progress.window(0.2, 0.9);
        let total = units.len();

        let mut results = Vec::with_capacity(total);
        for (index, (dataset, matrix, mapping)) in units.into_iter().enumerate() {
            let normalization = NormalizationConfig::from_dataset(dataset)?;
            let prepared = kernel.prepare(dataset, matrix, &normalization)?;

            let window = kernel_window.window(
                index as f64 / total as f64,
                (index + 1) as f64 / total as f64,
            );
            let kernel = kernel.clone();
            let options = options.clone();
            let name = dataset.name.clone();

            // The kernel is CPU-bound; keep it off the async runtime
            let (pathways, fold_changes) = tokio::task::spawn_blocking(move || {
                let pathways = kernel.process(&prepared, &mapping, &options, &window)?;
                let fold_changes = kernel.gene_fold_changes(&prepared);
                Ok::<_, GsaError>((pathways, fold_changes))
            })
            .await
            .map_err(|e| GsaError::Infrastructure(format!("Analysis task failed: {}", e)))??;

            results.push(DatasetResult {
                name,
                pathways,
                fold_changes,
            });
        }

        drop(progress);
        drop(kernel_window);
        let _ = drain.await;

        let mut mappings: Vec<IdentifierMapping> = identifier_mappings
            .into_iter()
            .map(|(identifier, mapped_to)| IdentifierMapping {
                identifier,
                mapped_to,
            })
            .collect();
        mappings.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let result = AnalysisResult {
            release: self.config.pathway_release.clone(),
            method_name: input.method_name.to_lowercase(),
            results,
            reactome_links: None,
            mappings,
        };

        let raw = serde_json::to_vec(&result)?;
        self.registry
            .blackboard()
            .put(
                &keys::result(job_id),
                &raw,
                Some(self.config.backend.result_ttl),
            )
            .await?;
        self.registry
            .complete(JobKind::Analysis, job_id, "Analysis done")
            .await?;

        if input.wants_report() {
            self.request_report(job_id, input.user_mail()).await;
        }

        Ok(())
    }

    /// Publish the follow-up report job; failures only get logged, the
    /// analysis itself already succeeded.
    async fn request_report(&self, job_id: &str, user_mail: Option<&str>) {
        let report = ReportJob {
            job_id: job_id.to_string(),
            kinds: vec![ArtifactKind::Spreadsheet, ArtifactKind::Pdf],
            user_mail: user_mail.map(str::to_string),
        };
        let payload = match serde_json::to_vec(&report) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(job_id, error = %err, "Failed to encode report message");
                return;
            }
        };

        if let Err(err) = publish_with_retry(
            &*self.broker,
            Queue::Report,
            &payload,
            self.config.backend.max_message_tries,
        )
        .await
        {
            tracing::error!(job_id, error = %err, "Failed to submit report generation message");
        } else {
            tracing::debug!(job_id, "Report generation requested");
        }
    }

    fn load_gene_set(&self, use_interactors: bool, include_disease: bool) -> Result<GeneSet> {
        match &self.config.pathway_directory {
            Some(directory) => GeneSet::from_file(&pathway_file(
                directory,
                "reactome",
                use_interactors,
                include_disease,
            )),
            None => Ok(GeneSet::sample()),
        }
    }
}

fn flag(value: Option<&str>, default: bool) -> bool {
    value
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
