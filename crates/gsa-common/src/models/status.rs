//! Job status records stored on the blackboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// The only legal transitions are `running -> complete` and
/// `running -> failed`; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }
}

/// The three job families handled by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Analysis,
    Dataset,
    Report,
}

impl JobKind {
    /// Prefix used when allocating job identifiers of this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            JobKind::Analysis => "Analysis",
            JobKind::Dataset => "Load",
            JobKind::Report => "Report",
        }
    }

    /// Blackboard key of the monotonic counter for this kind
    pub fn counter_key(&self) -> &'static str {
        match self {
            JobKind::Analysis => "counter:analysis",
            JobKind::Dataset => "counter:dataset",
            JobKind::Report => "counter:report",
        }
    }

    /// Recover the kind from an allocated identifier
    pub fn from_job_id(job_id: &str) -> Option<JobKind> {
        if job_id.starts_with("Analysis") {
            Some(JobKind::Analysis)
        } else if job_id.starts_with("Load") {
            Some(JobKind::Dataset)
        } else if job_id.starts_with("Report") {
            Some(JobKind::Report)
        } else {
            None
        }
    }
}

/// A produced report artifact, referenced from a report status record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    /// Short artifact name, e.g. "XLSX" or "PDF"
    pub name: String,
    /// API endpoint streaming the artifact bytes
    pub url: String,
    pub mimetype: String,
}

/// Status record stored under `status:{job_id}` (and
/// `report:{job_id}:status` for report jobs).
///
/// Report and dataset-loading statuses use the same record with their
/// respective extension fields populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    #[serde(rename = "status")]
    pub state: JobState,
    /// Relative completion in [0, 1]; nondecreasing while running
    #[serde(rename = "completed")]
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Artifacts produced by a report job
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<ReportArtifact>,
    /// Identifier of the dataset produced by a loading job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

impl JobStatus {
    /// A fresh `running` record at zero progress
    pub fn queued(id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: JobState::Running,
            progress: 0.0,
            description: Some(description.into()),
            created_at: now,
            updated_at: now,
            reports: Vec::new(),
            dataset_id: None,
        }
    }
}
