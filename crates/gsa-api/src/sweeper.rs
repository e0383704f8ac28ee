//! The stall sweeper.
//!
//! Progress updates are the only liveness signal a running job emits.
//! When a `running` record has not been touched for longer than the
//! configured stall timeout - because a worker died, or the broker
//! dropped the message after its delivery limit - the sweeper promotes
//! it to `failed` so clients are not left polling forever.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gsa_common::blackboard::{keys, Blackboard, BlackboardRef};
use gsa_common::models::{JobKind, JobState, JobStatus};
use gsa_common::notify::{alert_operator, NotifierRef};
use gsa_common::registry::{JobRegistry, Transition};

/// Background task promoting silent running jobs to failed
pub struct StallSweeper {
    board: BlackboardRef,
    registry: Arc<JobRegistry>,
    notifier: NotifierRef,
    /// Stall limit for analysis and report jobs
    worker_timeout: Duration,
    /// Stall limit for dataset loading jobs
    loading_timeout: Duration,
    interval: Duration,
}

impl StallSweeper {
    pub fn new(
        board: BlackboardRef,
        registry: Arc<JobRegistry>,
        notifier: NotifierRef,
        worker_timeout: Duration,
        loading_timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            board,
            registry,
            notifier,
            worker_timeout,
            loading_timeout,
            interval,
        }
    }

    /// Run the sweep loop until the task is aborted
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                worker_timeout_secs = self.worker_timeout.as_secs(),
                loading_timeout_secs = self.loading_timeout.as_secs(),
                "Stall sweeper started"
            );
            loop {
                tokio::time::sleep(self.interval).await;
                match self.sweep().await {
                    Ok(0) => {}
                    Ok(swept) => tracing::info!(swept, "Promoted stalled jobs to failed"),
                    Err(err) => tracing::error!(error = %err, "Sweep failed"),
                }
            }
        })
    }

    /// One pass over all status records; returns how many were promoted
    pub async fn sweep(&self) -> Result<u32> {
        let mut swept = 0;

        for key in self.board.scan(keys::STATUS_PREFIX).await? {
            let job_id = key.trim_start_matches(keys::STATUS_PREFIX).to_string();
            let Some(kind) = JobKind::from_job_id(&job_id) else {
                continue;
            };
            swept += self.sweep_record(kind, &job_id, &key).await;
        }

        // Report statuses live in their own namespace
        for key in self.board.scan(keys::REPORT_PREFIX).await? {
            let Some(job_id) = key
                .strip_prefix(keys::REPORT_PREFIX)
                .and_then(|rest| rest.strip_suffix(":status"))
                .map(str::to_string)
            else {
                continue;
            };
            swept += self.sweep_record(JobKind::Report, &job_id, &key).await;
        }

        Ok(swept)
    }

    async fn sweep_record(&self, kind: JobKind, job_id: &str, key: &str) -> u32 {
        let status = match self.board.get(key).await {
            Ok(Some(raw)) => match serde_json::from_slice::<JobStatus>(&raw) {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!(key, error = %err, "Skipping unreadable status record");
                    return 0;
                }
            },
            _ => return 0,
        };

        if status.state != JobState::Running || !self.is_stalled(kind, &status) {
            return 0;
        }

        let description = "Worker timeout - the analysis did not report any progress. \
                           Please resubmit your request.";
        match self.registry.fail(kind, job_id, description).await {
            Ok(Transition::Applied) => {
                tracing::warn!(job_id, kind = ?kind, "Promoted stalled job to failed");
                alert_operator(&*self.notifier, job_id, "worker timeout").await;
                1
            }
            Ok(_) => 0,
            Err(err) => {
                tracing::error!(job_id, error = %err, "Failed to promote stalled job");
                0
            }
        }
    }

    fn is_stalled(&self, kind: JobKind, status: &JobStatus) -> bool {
        let limit = match kind {
            JobKind::Dataset => self.loading_timeout,
            _ => self.worker_timeout,
        };
        let age = chrono::Utc::now().signed_duration_since(status.updated_at);
        age.to_std().map(|age| age > limit).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsa_common::blackboard::{Blackboard, MemoryBlackboard};
    use gsa_common::notify::LogNotifier;

    async fn seed_running(board: &BlackboardRef, job_id: &str, age: chrono::Duration) {
        let mut status = JobStatus::queued(job_id, "working");
        status.updated_at = chrono::Utc::now() - age;
        board
            .put(
                &keys::status(job_id),
                &serde_json::to_vec(&status).unwrap(),
                None,
            )
            .await
            .unwrap();
    }

    fn sweeper(board: BlackboardRef, registry: Arc<JobRegistry>) -> StallSweeper {
        StallSweeper::new(
            board,
            registry,
            Arc::new(LogNotifier),
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_stalled_job_is_promoted() {
        let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
        let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

        seed_running(&board, "Analysis00000001", chrono::Duration::seconds(120)).await;
        let swept = sweeper(board, registry.clone()).sweep().await.unwrap();
        assert_eq!(swept, 1);

        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert!(status.description.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_live_job_is_left_alone() {
        let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
        let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

        seed_running(&board, "Analysis00000002", chrono::Duration::seconds(5)).await;
        let swept = sweeper(board.clone(), registry.clone()).sweep().await.unwrap();
        assert_eq!(swept, 0);

        let status = registry
            .get_status(JobKind::Analysis, "Analysis00000002")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_dataset_jobs_use_the_loading_timeout() {
        let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
        let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

        // 120s old: past the 60s worker timeout but inside the 300s
        // loading timeout
        seed_running(&board, "Load00000001", chrono::Duration::seconds(120)).await;
        let swept = sweeper(board.clone(), registry.clone()).sweep().await.unwrap();
        assert_eq!(swept, 0);

        seed_running(&board, "Load00000002", chrono::Duration::seconds(400)).await;
        let swept = sweeper(board, registry).sweep().await.unwrap();
        assert_eq!(swept, 1);
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_never_touched() {
        let board: BlackboardRef = Arc::new(MemoryBlackboard::new());
        let registry = JobRegistry::new(board.clone(), Duration::from_secs(3600));

        registry
            .seed(JobKind::Analysis, "Analysis00000003", "Queued")
            .await
            .unwrap();
        registry
            .complete(JobKind::Analysis, "Analysis00000003", "done")
            .await
            .unwrap();

        // Backdate the completed record far past any timeout
        let raw = board.get(&keys::status("Analysis00000003")).await.unwrap().unwrap();
        let mut status: JobStatus = serde_json::from_slice(&raw).unwrap();
        status.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        board
            .put(
                &keys::status("Analysis00000003"),
                &serde_json::to_vec(&status).unwrap(),
                None,
            )
            .await
            .unwrap();

        let swept = sweeper(board, registry).sweep().await.unwrap();
        assert_eq!(swept, 0);
    }
}
