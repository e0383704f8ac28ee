//! Typed job registry over the blackboard.
//!
//! All status mutations go through compare-and-set loops so the invariants
//! hold under concurrent writers and redelivered messages:
//!
//! - states only move along `running -> complete | failed`; a terminal
//!   record is never modified again
//! - progress is nondecreasing while running
//! - observers always see a monotone sequence of records

use std::sync::Arc;
use std::time::Duration;

use crate::blackboard::{keys, Blackboard, BlackboardError, BlackboardRef};
use crate::models::{JobKind, JobState, JobStatus, ReportArtifact};

/// Attempts before a CAS update is reported as an infrastructure problem
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Outcome of a status transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record was updated
    Applied,
    /// The record is already terminal; nothing was written
    AlreadyTerminal,
    /// No status record exists for the id
    Missing,
}

/// Errors raised by the registry
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Blackboard(#[from] BlackboardError),

    #[error("Status record for {0} is corrupt: {1}")]
    Corrupt(String, String),

    #[error("Gave up updating status for {0} after contention")]
    Contended(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Where a job's status record lives
fn status_key_for(kind: JobKind, job_id: &str) -> String {
    match kind {
        // Report statuses sit in the report namespace so they never clash
        // with the analysis record of the same job id
        JobKind::Report => keys::report_status(job_id),
        _ => keys::status(job_id),
    }
}

/// The durable job registry shared by every service role
pub struct JobRegistry {
    board: BlackboardRef,
    status_ttl: Duration,
}

impl JobRegistry {
    pub fn new(board: BlackboardRef, status_ttl: Duration) -> Arc<Self> {
        Arc::new(Self { board, status_ttl })
    }

    pub fn blackboard(&self) -> &BlackboardRef {
        &self.board
    }

    /// Allocate a new job id: kind prefix plus a zero-padded atomic counter
    pub async fn allocate_id(&self, kind: JobKind) -> RegistryResult<String> {
        let serial = self.board.atomic_increment(kind.counter_key()).await?;
        Ok(format!("{}{:08}", kind.id_prefix(), serial))
    }

    /// Seed the initial `running` record for a freshly admitted job
    pub async fn seed(
        &self,
        kind: JobKind,
        job_id: &str,
        description: &str,
    ) -> RegistryResult<()> {
        let status = JobStatus::queued(job_id, description);
        let raw = serde_json::to_vec(&status)
            .map_err(|e| RegistryError::Corrupt(job_id.to_string(), e.to_string()))?;
        self.board
            .put(&status_key_for(kind, job_id), &raw, Some(self.status_ttl))
            .await?;
        Ok(())
    }

    pub async fn get_status(
        &self,
        kind: JobKind,
        job_id: &str,
    ) -> RegistryResult<Option<JobStatus>> {
        let key = status_key_for(kind, job_id);
        self.decode(&key, self.board.get(&key).await?)
    }

    /// Raw status bytes, exactly as served to clients
    pub async fn get_status_raw(
        &self,
        kind: JobKind,
        job_id: &str,
    ) -> RegistryResult<Option<Vec<u8>>> {
        Ok(self.board.get(&status_key_for(kind, job_id)).await?)
    }

    /// Update progress and description of a running job.
    ///
    /// Progress never decreases: a lower value keeps the stored one while
    /// still refreshing the description and timestamp.
    pub async fn update_progress(
        &self,
        kind: JobKind,
        job_id: &str,
        progress: f64,
        description: &str,
    ) -> RegistryResult<Transition> {
        self.transition(kind, job_id, |current| {
            let mut next = current.clone();
            next.progress = progress.clamp(0.0, 1.0).max(current.progress);
            next.description = Some(description.to_string());
            next
        })
        .await
    }

    /// Transition a job to `complete` with progress 1.0
    pub async fn complete(
        &self,
        kind: JobKind,
        job_id: &str,
        description: &str,
    ) -> RegistryResult<Transition> {
        self.transition(kind, job_id, |current| {
            let mut next = current.clone();
            next.state = JobState::Complete;
            next.progress = 1.0;
            next.description = Some(description.to_string());
            next
        })
        .await
    }

    /// Complete a report job, recording its produced artifacts
    pub async fn complete_report(
        &self,
        job_id: &str,
        description: &str,
        artifacts: Vec<ReportArtifact>,
    ) -> RegistryResult<Transition> {
        self.transition(JobKind::Report, job_id, |current| {
            let mut next = current.clone();
            next.state = JobState::Complete;
            next.progress = 1.0;
            next.description = Some(description.to_string());
            next.reports = artifacts.clone();
            next
        })
        .await
    }

    /// Complete a dataset-loading job, publishing the produced dataset id
    pub async fn complete_dataset(
        &self,
        loading_id: &str,
        description: &str,
        dataset_id: &str,
    ) -> RegistryResult<Transition> {
        self.transition(JobKind::Dataset, loading_id, |current| {
            let mut next = current.clone();
            next.state = JobState::Complete;
            next.progress = 1.0;
            next.description = Some(description.to_string());
            next.dataset_id = Some(dataset_id.to_string());
            next
        })
        .await
    }

    /// Transition a job to `failed`, keeping the last progress value
    pub async fn fail(
        &self,
        kind: JobKind,
        job_id: &str,
        description: &str,
    ) -> RegistryResult<Transition> {
        self.transition(kind, job_id, |current| {
            let mut next = current.clone();
            next.state = JobState::Failed;
            next.description = Some(description.to_string());
            next
        })
        .await
    }

    /// CAS loop applying `build` to the current record.
    ///
    /// Terminal records are left untouched; lost races re-read and retry.
    async fn transition<F>(
        &self,
        kind: JobKind,
        job_id: &str,
        build: F,
    ) -> RegistryResult<Transition>
    where
        F: Fn(&JobStatus) -> JobStatus,
    {
        let key = status_key_for(kind, job_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(raw) = self.board.get(&key).await? else {
                return Ok(Transition::Missing);
            };
            let Some(current) = self.decode(&key, Some(raw.clone()))? else {
                return Ok(Transition::Missing);
            };

            if current.state.is_terminal() {
                return Ok(Transition::AlreadyTerminal);
            }

            let mut next = build(&current);
            next.updated_at = chrono::Utc::now();
            let encoded = serde_json::to_vec(&next)
                .map_err(|e| RegistryError::Corrupt(job_id.to_string(), e.to_string()))?;

            if self
                .board
                .compare_and_set(&key, Some(&raw), &encoded, Some(self.status_ttl))
                .await?
            {
                return Ok(Transition::Applied);
            }
        }

        Err(RegistryError::Contended(job_id.to_string()))
    }

    fn decode(&self, key: &str, raw: Option<Vec<u8>>) -> RegistryResult<Option<JobStatus>> {
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| RegistryError::Corrupt(key.to_string(), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::MemoryBlackboard;

    fn registry() -> Arc<JobRegistry> {
        JobRegistry::new(
            Arc::new(MemoryBlackboard::new()),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_allocated_ids_are_unique_and_padded() {
        let registry = registry();
        let first = registry.allocate_id(JobKind::Analysis).await.unwrap();
        let second = registry.allocate_id(JobKind::Analysis).await.unwrap();

        assert_eq!(first, "Analysis00000001");
        assert_eq!(second, "Analysis00000002");

        // Counters are per kind
        let load = registry.allocate_id(JobKind::Dataset).await.unwrap();
        assert_eq!(load, "Load00000001");
    }

    #[tokio::test]
    async fn test_lifecycle_is_monotone() {
        let registry = registry();
        registry
            .seed(JobKind::Analysis, "Analysis00000001", "Queued")
            .await
            .unwrap();

        let applied = registry
            .update_progress(JobKind::Analysis, "Analysis00000001", 0.5, "halfway")
            .await
            .unwrap();
        assert_eq!(applied, Transition::Applied);

        // Progress never decreases
        registry
            .update_progress(JobKind::Analysis, "Analysis00000001", 0.2, "stale update")
            .await
            .unwrap();
        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.progress, 0.5);
        assert_eq!(status.description.as_deref(), Some("stale update"));

        registry
            .complete(JobKind::Analysis, "Analysis00000001", "Analysis done")
            .await
            .unwrap();

        // No transition out of a terminal state
        let outcome = registry
            .fail(JobKind::Analysis, "Analysis00000001", "late failure")
            .await
            .unwrap();
        assert_eq!(outcome, Transition::AlreadyTerminal);

        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, JobState::Complete);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn test_failed_keeps_last_progress() {
        let registry = registry();
        registry
            .seed(JobKind::Analysis, "Analysis00000002", "Queued")
            .await
            .unwrap();
        registry
            .update_progress(JobKind::Analysis, "Analysis00000002", 0.4, "working")
            .await
            .unwrap();
        registry
            .fail(JobKind::Analysis, "Analysis00000002", "kernel failed")
            .await
            .unwrap();

        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000002")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.progress, 0.4);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let registry = registry();
        let outcome = registry
            .update_progress(JobKind::Analysis, "Analysis99999999", 0.5, "ghost")
            .await
            .unwrap();
        assert_eq!(outcome, Transition::Missing);
    }

    #[tokio::test]
    async fn test_report_status_namespace_is_separate() {
        let registry = registry();
        registry
            .seed(JobKind::Analysis, "Analysis00000003", "Queued")
            .await
            .unwrap();
        registry
            .seed(JobKind::Report, "Analysis00000003", "Report queued")
            .await
            .unwrap();

        registry
            .complete_report(
                "Analysis00000003",
                "Report generation complete.",
                vec![ReportArtifact {
                    name: "XLSX".to_string(),
                    url: "/0.1/result/Analysis00000003.xlsx".to_string(),
                    mimetype: "application/vnd.ms-excel".to_string(),
                }],
            )
            .await
            .unwrap();

        // The analysis record is untouched
        let analysis = registry
            .get_status(JobKind::Analysis, "Analysis00000003")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.state, JobState::Running);

        let report = registry
            .get_status(JobKind::Report, "Analysis00000003")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.state, JobState::Complete);
        assert_eq!(report.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_cannot_roll_back() {
        let registry = registry();
        registry
            .seed(JobKind::Analysis, "Analysis00000004", "Queued")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .update_progress(
                        JobKind::Analysis,
                        "Analysis00000004",
                        f64::from(i) / 10.0,
                        "racing",
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000004")
            .await
            .unwrap()
            .unwrap();
        // The stored progress is the maximum any writer observed
        assert_eq!(status.progress, 0.7);
    }
}
