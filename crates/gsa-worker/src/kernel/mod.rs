//! The statistical kernel capability and its registry.
//!
//! A kernel turns one prepared dataset into a pathway table with the
//! required columns `Pathway`, `Direction`, `FDR` and `PValue`. Kernels
//! are plug-in implementations selected by method name; the orchestration
//! around them never depends on which one runs.

pub mod enrichment;
pub mod normalize;
pub mod scoring;
pub mod stats;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::{AnalysisInput, Dataset};
use gsa_common::{GsaError, Result};

use crate::genesets::GeneSetMapping;
use crate::progress::ProgressHandle;

pub use enrichment::EnrichmentKernel;
pub use scoring::ScoringKernel;

/// Normalisation method for count-like data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscreteNorm {
    #[default]
    Tmm,
    Rle,
    UpperQuartile,
    None,
}

impl FromStr for DiscreteNorm {
    type Err = GsaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TMM" => Ok(DiscreteNorm::Tmm),
            "RLE" => Ok(DiscreteNorm::Rle),
            "upperquartile" => Ok(DiscreteNorm::UpperQuartile),
            "none" => Ok(DiscreteNorm::None),
            other => Err(GsaError::Validation(format!(
                "Unknown discrete normalisation function '{}'",
                other
            ))),
        }
    }
}

/// Normalisation method for continuous data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuousNorm {
    #[default]
    None,
    Scale,
    Quantile,
    CyclicLoess,
}

impl FromStr for ContinuousNorm {
    type Err = GsaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ContinuousNorm::None),
            "scale" => Ok(ContinuousNorm::Scale),
            "quantile" => Ok(ContinuousNorm::Quantile),
            "cyclicloess" => Ok(ContinuousNorm::CyclicLoess),
            other => Err(GsaError::Validation(format!(
                "Unknown continuous normalisation function '{}'",
                other
            ))),
        }
    }
}

/// Normalisation options, passed explicitly down the call chain
#[derive(Debug, Clone, Default)]
pub struct NormalizationConfig {
    pub discrete: DiscreteNorm,
    pub continuous: ContinuousNorm,
    /// Sample property naming matched pairs; `None` means an unpaired
    /// design
    pub sample_groups: Option<String>,
}

impl NormalizationConfig {
    /// Read the per-dataset normalisation parameters
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let discrete = match dataset.parameter("discrete_norm_function") {
            Some(value) => value.parse()?,
            None => DiscreteNorm::default(),
        };
        let continuous = match dataset.parameter("continuous_norm_function") {
            Some(value) => value.parse()?,
            None => ContinuousNorm::default(),
        };
        let sample_groups = dataset
            .parameter("sample_groups")
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string());

        Ok(Self {
            discrete,
            continuous,
            sample_groups,
        })
    }
}

/// Analysis-level options a kernel may honour
#[derive(Debug, Clone)]
pub struct KernelOptions {
    pub min_size: usize,
    pub max_size: usize,
    /// Restrict the analysis to these pathway ids or names
    pub pathway_filter: Option<HashSet<String>>,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 1000,
            pathway_filter: None,
        }
    }
}

impl KernelOptions {
    pub fn from_input(input: &AnalysisInput) -> Self {
        let defaults = Self::default();
        let min_size = input
            .parameter("min_size")
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.min_size);
        let max_size = input
            .parameter("max_size")
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.max_size);
        let pathway_filter = input
            .parameter("pathways")
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .split(',')
                    .map(|entry| entry.trim().to_string())
                    .filter(|entry| !entry.is_empty())
                    .collect()
            });

        Self {
            min_size,
            max_size,
            pathway_filter,
        }
    }

    /// Whether a mapped pathway passes the size and name filters
    pub fn admits(&self, id: &str, name: &str, size: usize) -> bool {
        if size < self.min_size || size > self.max_size {
            return false;
        }
        match &self.pathway_filter {
            Some(filter) => filter.contains(id) || filter.contains(name),
            None => true,
        }
    }
}

/// A dataset after normalisation and group resolution
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub name: String,
    pub matrix: ExpressionMatrix,
    /// Column indices of the first comparison group
    pub group1: Vec<usize>,
    /// Column indices of the second comparison group
    pub group2: Vec<usize>,
    /// Matched column pairs for a paired design
    pub pairs: Option<Vec<(usize, usize)>>,
}

/// The inner statistical procedure behind a method name
pub trait AnalysisKernel: Send + Sync {
    /// Whether the kernel needs an experimental design
    fn uses_design(&self) -> bool;

    /// Normalise the matrix and resolve comparison groups
    fn prepare(
        &self,
        dataset: &Dataset,
        matrix: ExpressionMatrix,
        config: &NormalizationConfig,
    ) -> Result<PreparedDataset>;

    /// Run the analysis, producing the tab-delimited pathway table
    fn process(
        &self,
        prepared: &PreparedDataset,
        mapping: &GeneSetMapping,
        options: &KernelOptions,
        progress: &ProgressHandle,
    ) -> Result<String>;

    /// Per-gene fold change table, when the method computes one
    fn gene_fold_changes(&self, prepared: &PreparedDataset) -> Option<String>;
}

/// Resolve the kernel for a method name (case-insensitive)
pub fn kernel_for_method(method_name: &str) -> Option<Arc<dyn AnalysisKernel>> {
    match method_name.trim().to_lowercase().as_str() {
        "camera" => Some(Arc::new(EnrichmentKernel::competitive())),
        "padog" => Some(Arc::new(EnrichmentKernel::weighted())),
        "ssgsea" => Some(Arc::new(ScoringKernel)),
        _ => None,
    }
}

/// Resolve matched sample pairs for a paired design.
///
/// Each value of the pairing covariate must occur exactly once in either
/// comparison group.
pub(crate) fn resolve_pairs(
    dataset: &Dataset,
    group1: &[usize],
    group2: &[usize],
    sample_groups: &str,
) -> Result<Vec<(usize, usize)>> {
    let design = dataset
        .design
        .as_ref()
        .ok_or_else(|| GsaError::Validation("Paired analysis requires a design".to_string()))?;

    let labels = design.covariates.get(sample_groups).ok_or_else(|| {
        GsaError::Validation(format!(
            "Dataset '{}' does not define the sample property '{}'",
            dataset.name, sample_groups
        ))
    })?;

    let mut pairs = Vec::new();
    for &column1 in group1 {
        let label = &labels[column1];
        let matches: Vec<usize> = group2
            .iter()
            .copied()
            .filter(|&column2| &labels[column2] == label)
            .collect();
        if matches.len() != 1 {
            return Err(GsaError::Validation(format!(
                "Paired analysis of dataset '{}': sample group '{}' must occur exactly once in \
                 each analysis group.",
                dataset.name, label
            )));
        }
        pairs.push((column1, matches[0]));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsa_common::models::{Comparison, DataType, Design, Parameter};

    fn paired_dataset() -> Dataset {
        let mut covariates = std::collections::BTreeMap::new();
        covariates.insert(
            "patient".to_string(),
            vec![
                "p1".to_string(),
                "p2".to_string(),
                "p1".to_string(),
                "p2".to_string(),
            ],
        );
        Dataset {
            name: "paired".to_string(),
            data_type: DataType::ProteomicsInt,
            data: String::new(),
            design: Some(Design {
                samples: vec!["A1".into(), "A2".into(), "B1".into(), "B2".into()],
                comparison: Comparison {
                    group1: "before".to_string(),
                    group2: "after".to_string(),
                },
                analysis_group: vec![
                    "before".into(),
                    "before".into(),
                    "after".into(),
                    "after".into(),
                ],
                covariates,
            }),
            parameters: vec![Parameter::new("sample_groups", "patient")],
        }
    }

    #[test]
    fn test_kernel_registry() {
        assert!(kernel_for_method("Camera").is_some());
        assert!(kernel_for_method("padog").is_some());
        assert!(kernel_for_method("ssGSEA").is_some());
        assert!(kernel_for_method("gsea").is_none());
    }

    #[test]
    fn test_normalization_config_from_dataset() {
        let dataset = paired_dataset();
        let config = NormalizationConfig::from_dataset(&dataset).unwrap();
        assert_eq!(config.discrete, DiscreteNorm::Tmm);
        assert_eq!(config.sample_groups.as_deref(), Some("patient"));
    }

    #[test]
    fn test_invalid_norm_function_rejected() {
        let mut dataset = paired_dataset();
        dataset.parameters = vec![Parameter::new("discrete_norm_function", "median")];
        assert!(NormalizationConfig::from_dataset(&dataset).is_err());
    }

    #[test]
    fn test_resolve_pairs() {
        let dataset = paired_dataset();
        let pairs = resolve_pairs(&dataset, &[0, 1], &[2, 3], "patient").unwrap();
        assert_eq!(pairs, vec![(0, 2), (1, 3)]);
    }

    #[test]
    fn test_unbalanced_pairs_rejected() {
        let mut dataset = paired_dataset();
        if let Some(design) = dataset.design.as_mut() {
            design.covariates.insert(
                "patient".to_string(),
                vec![
                    "p1".to_string(),
                    "p2".to_string(),
                    "p1".to_string(),
                    "p1".to_string(),
                ],
            );
        }
        assert!(resolve_pairs(&dataset, &[0, 1], &[2, 3], "patient").is_err());
    }

    #[test]
    fn test_kernel_options_from_input() {
        let input = AnalysisInput {
            method_name: "ssGSEA".to_string(),
            datasets: vec![],
            parameters: vec![
                Parameter::new("min_size", "3"),
                Parameter::new("pathways", "P-0001, Interferon signaling"),
            ],
            analysis_id: None,
        };
        let options = KernelOptions::from_input(&input);
        assert_eq!(options.min_size, 3);
        assert_eq!(options.max_size, 1000);
        assert!(options.admits("P-0001", "B cell receptor signaling", 5));
        assert!(!options.admits("P-0002", "Melanocyte development", 5));
        assert!(!options.admits("P-0001", "B cell receptor signaling", 2));
    }
}
