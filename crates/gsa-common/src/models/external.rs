//! Records describing externally loaded datasets and their sources.

use serde::{Deserialize, Serialize};

use super::input::Parameter;

/// One named metadata column, parallel to the dataset's sample ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub name: String,
    pub values: Vec<String>,
}

/// Summary record of a loaded dataset, stored under `dataset:{dataset_id}`.
///
/// The normalized expression matrix itself lives next to it under
/// `dataset:{dataset_id}:data`. Read-only once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalData {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Originating source group, e.g. "grein" or "example"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_metadata: Vec<SampleMetadata>,
    /// Parameters a subsequent analysis should default to for this data
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_parameters: Vec<Parameter>,
}

/// Parameter declared by an external data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceParameter {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Catalog record for a loadable external data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDatasource {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<DatasourceParameter>,
}
