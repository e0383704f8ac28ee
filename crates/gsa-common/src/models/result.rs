//! The analysis result written once on successful completion.

use serde::{Deserialize, Serialize};

/// Result tables for one submitted dataset.
///
/// `pathways` is a tab-delimited matrix with at least the columns
/// `Pathway`, `Direction` (up/down), `FDR` and `PValue`. `fold_changes`
/// carries per-gene effect sizes when the method computes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetResult {
    pub name: String,
    pub pathways: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fold_changes: Option<String>,
}

/// Link to an externally hosted visualization of the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationLink {
    pub name: String,
    pub url: String,
}

/// Mapping of one submitted identifier to database identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierMapping {
    pub identifier: String,
    pub mapped_to: Vec<String>,
}

/// Complete analysis result, stored under `result:{job_id}`.
///
/// Written exactly once by the worker; a result blob exists on the
/// blackboard iff the job status is `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Pathway database release the analysis ran against
    pub release: String,
    #[serde(rename = "methodName")]
    pub method_name: String,
    pub results: Vec<DatasetResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactome_links: Option<Vec<VisualizationLink>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<IdentifierMapping>,
}
