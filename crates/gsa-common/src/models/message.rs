//! Work items exchanged through the broker.
//!
//! Messages are self-contained: redelivery must not depend on any other
//! state than the blackboard records the job itself owns.

use serde::{Deserialize, Serialize};

use super::input::{AnalysisInput, Parameter};

/// Work item on the `analysis` queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: String,
    /// The validated, normalized request
    pub input: AnalysisInput,
    /// Hint for the consumer; the broker's own delivery limit still applies
    pub max_attempts: u32,
}

/// Work item on the `dataset` queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetJob {
    /// Identifier of the loading task (not of the produced dataset)
    pub loading_id: String,
    /// External resource to load, e.g. "EXAMPLE_MEL_RNA" or a GEO accession
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// Artifact kinds a report job may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Spreadsheet,
    Pdf,
}

impl ArtifactKind {
    /// Short artifact name used in status records and storage keys
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Spreadsheet => "XLSX",
            ArtifactKind::Pdf => "PDF",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Spreadsheet => "xlsx",
            ArtifactKind::Pdf => "pdf",
        }
    }

    pub fn mimetype(&self) -> &'static str {
        match self {
            ArtifactKind::Spreadsheet => "application/vnd.ms-excel",
            ArtifactKind::Pdf => "application/pdf",
        }
    }
}

/// Work item on the `report` queue, keyed by the completed analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportJob {
    /// Identifier of the completed analysis this report is for
    pub job_id: String,
    pub kinds: Vec<ArtifactKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_mail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_job_round_trip() {
        let job = ReportJob {
            job_id: "Analysis00000001".to_string(),
            kinds: vec![ArtifactKind::Spreadsheet, ArtifactKind::Pdf],
            user_mail: Some("user@example.org".to_string()),
        };
        let bytes = serde_json::to_vec(&job).unwrap();
        let decoded: ReportJob = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(job, decoded);
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(ArtifactKind::Spreadsheet.name(), "XLSX");
        assert_eq!(ArtifactKind::Pdf.extension(), "pdf");
        assert_eq!(ArtifactKind::Pdf.mimetype(), "application/pdf");
    }
}
