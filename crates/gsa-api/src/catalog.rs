//! The static catalogs served by the API: methods, data types, external
//! data sources and example datasets.
//!
//! Compiled once at startup; example dataset summaries are read from the
//! example directory the dataset loader also serves from.

use serde::{Deserialize, Serialize};
use std::path::Path;

use gsa_common::models::{DatasourceParameter, ExternalData, ExternalDatasource};

use crate::methods::{self, Method};

/// A supported expression data type, as advertised by `/types`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTypeInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// All static catalogs in one place
pub struct Catalog {
    pub methods: Vec<Method>,
    pub data_types: Vec<DataTypeInfo>,
    pub sources: Vec<ExternalDatasource>,
    pub examples: Vec<ExternalData>,
}

impl Catalog {
    /// Build the catalog, reading example summaries from `example_dir`
    pub fn load(example_dir: Option<&Path>) -> Self {
        Self {
            methods: methods::available_methods(),
            data_types: data_types(),
            sources: datasources(),
            examples: example_dir.map(load_examples).unwrap_or_default(),
        }
    }

    /// Case-insensitive method lookup
    pub fn method(&self, name: &str) -> Option<&Method> {
        let wanted = name.trim().to_lowercase();
        self.methods
            .iter()
            .find(|method| method.name.to_lowercase() == wanted)
    }

    /// Whether any configured fetcher can serve this resource id
    pub fn resource_known(&self, resource_id: &str) -> bool {
        resource_id.starts_with("EXAMPLE_") || resource_id.starts_with("GSE")
    }
}

fn data_types() -> Vec<DataTypeInfo> {
    let entry = |id: &str, name: &str, description: &str| DataTypeInfo {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
    };

    vec![
        entry(
            "rnaseq_counts",
            "RNA-seq (raw counts)",
            "Raw RNA-seq based read counts per gene (recommended).",
        ),
        entry(
            "rnaseq_norm",
            "RNA-seq (normalized)",
            "log2 transformed, normalized RNA-seq based read counts per gene (f.e. RPKM, TPM).",
        ),
        entry(
            "proteomics_int",
            "Proteomics (intensity)",
            "Intensity-based quantitative proteomics data (for example iTRAQ/TMT or \
             intensity-based label-free quantitation). Values must be log2 transformed.",
        ),
        entry(
            "proteomics_sc",
            "Proteomics (spectral counts)",
            "Raw spectral counts of label-free proteomics experiments.",
        ),
        entry(
            "microarray_norm",
            "Microarray (normalized)",
            "Normalized and log2 transformed microarray-based gene expression values.",
        ),
        entry(
            "ribo_seq",
            "Ribo-seq",
            "Translational efficiency analysis combining RNA-seq and Ribo-seq read counts.",
        ),
    ]
}

fn datasources() -> Vec<ExternalDatasource> {
    vec![
        ExternalDatasource {
            id: "example_datasets".to_string(),
            name: "Example datasets".to_string(),
            description: Some("Curated example datasets shipped with the service.".to_string()),
            url: None,
            parameters: vec![],
        },
        ExternalDatasource {
            id: "grein".to_string(),
            name: "GREIN".to_string(),
            description: Some(
                "GEO RNA-seq Experiments Interactive Navigator: uniformly processed RNA-seq \
                 datasets from GEO."
                    .to_string(),
            ),
            url: Some("http://www.ilincs.org/apps/grein/".to_string()),
            parameters: vec![DatasourceParameter {
                name: "max_samples".to_string(),
                display_name: "Maximum samples".to_string(),
                data_type: "int".to_string(),
                required: false,
                description: Some("Limit the number of samples to load.".to_string()),
            }],
        },
    ]
}

/// Scan the example directory for `*.summary` files
fn load_examples(dir: &Path) -> Vec<ExternalData> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(directory = %dir.display(), error = %err, "Cannot read example directory");
            return Vec::new();
        }
    };

    let mut examples = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|ext| ext == "summary") != Some(true) {
            continue;
        }

        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<ExternalData>(&raw).map_err(|e| e.to_string()))
        {
            Ok(summary) => examples.push(summary),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "Skipping unreadable example summary");
            }
        }
    }

    examples.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(count = examples.len(), "Loaded example dataset catalog");
    examples
}
