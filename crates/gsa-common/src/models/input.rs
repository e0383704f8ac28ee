//! The analysis request as submitted by clients.
//!
//! Field names follow the public JSON contract (`methodName`,
//! `analysisGroup`, ...). Values are immutable once validated: the API
//! normalizes the request and serializes it into the queued work item
//! untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A name/value parameter pair.
///
/// Values travel as strings; typed coercion happens at admission against
/// the parameter's declaration in the method catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Supported expression data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    RnaseqCounts,
    RnaseqNorm,
    ProteomicsInt,
    ProteomicsSc,
    MicroarrayNorm,
    RiboSeq,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::RnaseqCounts => "rnaseq_counts",
            DataType::RnaseqNorm => "rnaseq_norm",
            DataType::ProteomicsInt => "proteomics_int",
            DataType::ProteomicsSc => "proteomics_sc",
            DataType::MicroarrayNorm => "microarray_norm",
            DataType::RiboSeq => "ribo_seq",
        }
    }

    /// Raw count-like data that takes the discrete normalisation path
    pub fn is_discrete(&self) -> bool {
        matches!(
            self,
            DataType::RnaseqCounts | DataType::ProteomicsSc | DataType::RiboSeq
        )
    }
}

/// The comparison performed between two groups of samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub group1: String,
    pub group2: String,
}

/// Experimental design: the assignment of samples to comparison groups.
///
/// Additional covariate arrays (patient, lab, ...) are captured in
/// `covariates` and must have the same arity as `samples`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    pub samples: Vec<String>,
    pub comparison: Comparison,
    #[serde(rename = "analysisGroup")]
    pub analysis_group: Vec<String>,
    #[serde(flatten)]
    pub covariates: BTreeMap<String, Vec<String>>,
}

/// A single dataset within an analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique name within the request
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Tab-delimited expression matrix, or a storage token referencing a
    /// previously loaded dataset
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design: Option<Design>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// A validated gene set analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    #[serde(rename = "methodName")]
    pub method_name: String,
    pub datasets: Vec<Dataset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Assigned by the API at admission; any client-provided value is
    /// discarded
    #[serde(rename = "analysisId", skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
}

impl AnalysisInput {
    /// Look up an analysis-level parameter value by name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Whether the request asked for report generation or an e-mail
    /// notification. Only then is a report job ever enqueued.
    pub fn wants_report(&self) -> bool {
        let create_reports = self
            .parameter("create_reports")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        create_reports || self.user_mail().is_some()
    }

    /// The notification address, when one was provided
    pub fn user_mail(&self) -> Option<&str> {
        self.parameter("email").filter(|mail| mail.len() > 3)
    }
}

impl Dataset {
    /// Dataset-level parameter value by name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_input() -> AnalysisInput {
        AnalysisInput {
            method_name: "Camera".to_string(),
            datasets: vec![Dataset {
                name: "proteomics".to_string(),
                data_type: DataType::ProteomicsInt,
                data: "\tS1\tS2\nP1\t1.0\t2.0".to_string(),
                design: Some(Design {
                    samples: vec!["S1".to_string(), "S2".to_string()],
                    comparison: Comparison {
                        group1: "a".to_string(),
                        group2: "b".to_string(),
                    },
                    analysis_group: vec!["a".to_string(), "b".to_string()],
                    covariates: BTreeMap::new(),
                }),
                parameters: vec![],
            }],
            parameters: vec![],
            analysis_id: None,
        }
    }

    #[test]
    fn test_round_trip_is_structurally_equal() {
        let input = minimal_input();
        let json = serde_json::to_string(&input).unwrap();
        let decoded: AnalysisInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input, decoded);
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(minimal_input()).unwrap();
        assert_eq!(json["methodName"], "Camera");
        assert_eq!(json["datasets"][0]["type"], "proteomics_int");
        assert!(json["datasets"][0]["design"]["analysisGroup"].is_array());
    }

    #[test]
    fn test_design_covariates_flatten() {
        let raw = r#"{
            "samples": ["S1", "S2"],
            "comparison": {"group1": "a", "group2": "b"},
            "analysisGroup": ["a", "b"],
            "patient": ["p1", "p2"]
        }"#;
        let design: Design = serde_json::from_str(raw).unwrap();
        assert_eq!(design.covariates["patient"], vec!["p1", "p2"]);
    }

    #[test]
    fn test_wants_report() {
        let mut input = minimal_input();
        assert!(!input.wants_report());

        input.parameters.push(Parameter::new("create_reports", "True"));
        assert!(input.wants_report());

        let mut mail_only = minimal_input();
        mail_only.parameters.push(Parameter::new("email", "user@example.org"));
        assert!(mail_only.wants_report());

        // Too short to be an address
        let mut bad_mail = minimal_input();
        bad_mail.parameters.push(Parameter::new("email", "x"));
        assert!(!bad_mail.wants_report());
    }
}
