//! The report generation loop.
//!
//! A report job references a completed analysis. Each requested artifact
//! is an independent sub-step with its own progress share (spreadsheet
//! 0.3, PDF 0.6, e-mail 0.1). One produced artifact is enough for the
//! report to complete; only when everything fails is the report failed.
//! Artifact writes are idempotent by key, so redeliveries are harmless.

use std::sync::Arc;

use gsa_common::blackboard::{keys, Blackboard};
use gsa_common::broker::{Broker, BrokerRef, Delivery, Queue};
use gsa_common::models::{
    AnalysisResult, ArtifactKind, JobKind, ReportArtifact, ReportJob,
};
use gsa_common::notify::{alert_operator, NotifierRef};
use gsa_common::registry::JobRegistry;
use gsa_common::{GsaError, Result};

use crate::artifacts;
use crate::config::ReportConfig;
use crate::mailer;

/// Progress share per sub-step
const SPREADSHEET_WEIGHT: f64 = 0.3;
const PDF_WEIGHT: f64 = 0.6;
const MAIL_WEIGHT: f64 = 0.1;

pub struct ReportGenerator {
    broker: BrokerRef,
    registry: Arc<JobRegistry>,
    config: Arc<ReportConfig>,
    notifier: NotifierRef,
}

impl ReportGenerator {
    pub fn new(
        broker: BrokerRef,
        registry: Arc<JobRegistry>,
        config: Arc<ReportConfig>,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            broker,
            registry,
            config,
            notifier,
        }
    }

    /// Blocking consume loop; exits only with the process
    pub async fn run(&self) {
        tracing::info!("Listening for report messages");
        loop {
            match self.broker.consume(Queue::Report).await {
                Ok(delivery) => self.handle_delivery(delivery).await,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to consume report message");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub async fn handle_delivery(&self, delivery: Delivery) {
        let job: ReportJob = match serde_json::from_slice(&delivery.payload) {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(error = %err, "Failed to decode report message");
                self.settle(&delivery, true).await;
                return;
            }
        };

        tracing::info!(job_id = %job.job_id, "Received report request");

        // Redelivery of a finished report is a no-op on the artifacts
        match self.registry.get_status(JobKind::Report, &job.job_id).await {
            Ok(Some(status)) if status.state.is_terminal() => {
                tracing::debug!(job_id = %job.job_id, "Report already settled");
                self.settle(&delivery, true).await;
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                if self
                    .registry
                    .seed(JobKind::Report, &job.job_id, "Queued")
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
                tracing::warn!(job_id = %job.job_id, error = %err, "Report generation failed");
                let _ = self
                    .registry
                    .fail(JobKind::Report, &job.job_id, &err.user_message())
                    .await;
                alert_operator(&*self.notifier, &job.job_id, &err.to_string()).await;
                self.settle(&delivery, true).await;
            }
            Err(err) => {
                tracing::error!(job_id = %job.job_id, error = %err, "Report generation interrupted");
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

    async fn process(&self, job: &ReportJob) -> Result<()> {
        let job_id = &job.job_id;
        let board = self.registry.blackboard();

        // The referenced analysis must already be complete
        let raw = board.get(&keys::result(job_id)).await?.ok_or_else(|| {
            GsaError::DataSource("Failed to retrieve analysis result".to_string())
        })?;
        let result: AnalysisResult = serde_json::from_slice(&raw)?;

        self.registry
            .update_progress(JobKind::Report, job_id, 0.05, "Creating reports")
            .await?;

        let mut produced: Vec<ReportArtifact> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut progress = 0.05_f64;

        for kind in &job.kinds {
            let weight = match kind {
                ArtifactKind::Spreadsheet => SPREADSHEET_WEIGHT,
                ArtifactKind::Pdf => PDF_WEIGHT,
            };

            match artifacts::render(*kind, job_id, &result) {
                Ok(bytes) => {
                    board
                        .put(
                            &keys::report_artifact(job_id, kind.name()),
                            &bytes,
                            Some(self.config.backend.result_ttl),
                        )
                        .await?;
                    produced.push(ReportArtifact {
                        name: kind.name().to_string(),
                        url: format!(
                            "{}/0.1/result/{}.{}",
                            self.config.base_url,
                            job_id,
                            kind.extension()
                        ),
                        mimetype: kind.mimetype().to_string(),
                    });
                    tracing::debug!(job_id, artifact = kind.name(), "Artifact stored");
                }
                Err(err) => {
                    tracing::error!(job_id, artifact = kind.name(), error = %err, "Artifact failed");
                    failures.push(format!("{} generation failed", kind.name()));
                }
            }

            progress = (progress + weight).min(0.9);
            self.registry
                .update_progress(JobKind::Report, job_id, progress, "Creating reports")
                .await?;
        }

        if produced.is_empty() {
            return Err(GsaError::PartialReport(failures.join("; ")));
        }

        // Notification failures never demote a report with artifacts
        if let Some(recipient) = &job.user_mail {
            self.registry
                .update_progress(JobKind::Report, job_id, 0.9 + MAIL_WEIGHT / 2.0, "Sending e-mail")
                .await?;
            let visualizations = result.reactome_links.clone().unwrap_or_default();
            mailer::send_result_notification(
                &*self.notifier,
                recipient,
                job_id,
                &produced,
                &visualizations,
            )
            .await;
        }

        let description = if failures.is_empty() {
            "Report generation complete.".to_string()
        } else {
            format!("Report generation complete. {}.", failures.join("; "))
        };
        self.registry
            .complete_report(job_id, &description, produced)
            .await?;

        tracing::info!(job_id, "Report complete");
        Ok(())
    }
}
