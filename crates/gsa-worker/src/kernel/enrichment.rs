//! Competitive enrichment kernel.
//!
//! Per-gene moderated t statistics between the comparison groups; per
//! pathway the member statistics are compared against the background of
//! all genes. The weighted variant down-weighs genes occurring in many
//! pathways before averaging.

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::Dataset;
use gsa_common::{GsaError, Result};

use crate::genesets::GeneSetMapping;
use crate::progress::ProgressHandle;

use super::normalize::normalize;
use super::stats::{
    benjamini_hochberg, mean, paired_t, standard_deviation, two_sided_p, welch_t,
};
use super::{
    resolve_pairs, AnalysisKernel, KernelOptions, NormalizationConfig, PreparedDataset,
};

/// Progress is reported once per this many pathways
const PROGRESS_CHUNK: usize = 10;

pub struct EnrichmentKernel {
    /// Down-weigh genes by their pathway frequency
    weighted: bool,
}

impl EnrichmentKernel {
    /// The Camera-style unweighted variant
    pub fn competitive() -> Self {
        Self { weighted: false }
    }

    /// The PADOG-style frequency-weighted variant
    pub fn weighted() -> Self {
        Self { weighted: true }
    }

    /// Per-gene test statistic and effect size
    fn gene_statistics(&self, prepared: &PreparedDataset) -> (Vec<f64>, Vec<f64>) {
        let matrix = &prepared.matrix;
        let mut statistics = Vec::with_capacity(matrix.n_rows());
        let mut fold_changes = Vec::with_capacity(matrix.n_rows());

        for row in 0..matrix.n_rows() {
            let values = matrix.row(row);
            match &prepared.pairs {
                Some(pairs) => {
                    let differences: Vec<f64> =
                        pairs.iter().map(|&(a, b)| values[a] - values[b]).collect();
                    statistics.push(paired_t(&differences));
                    fold_changes.push(mean(&differences));
                }
                None => {
                    let group1: Vec<f64> =
                        prepared.group1.iter().map(|&c| values[c]).collect();
                    let group2: Vec<f64> =
                        prepared.group2.iter().map(|&c| values[c]).collect();
                    statistics.push(welch_t(&group1, &group2));
                    fold_changes.push(mean(&group1) - mean(&group2));
                }
            }
        }
        (statistics, fold_changes)
    }
}

impl AnalysisKernel for EnrichmentKernel {
    fn uses_design(&self) -> bool {
        true
    }

    fn prepare(
        &self,
        dataset: &Dataset,
        matrix: ExpressionMatrix,
        config: &NormalizationConfig,
    ) -> Result<PreparedDataset> {
        let design = dataset.design.as_ref().ok_or_else(|| {
            GsaError::Validation(format!(
                "Dataset '{}' misses the required experimental design.",
                dataset.name
            ))
        })?;

        let normalized = normalize(&matrix, dataset.data_type, config);
        let (group1, group2) = crate::conversion::group_columns(design);

        let pairs = match &config.sample_groups {
            Some(sample_groups) => {
                Some(resolve_pairs(dataset, &group1, &group2, sample_groups)?)
            }
            None => None,
        };

        Ok(PreparedDataset {
            name: dataset.name.clone(),
            matrix: normalized,
            group1,
            group2,
            pairs,
        })
    }

    fn process(
        &self,
        prepared: &PreparedDataset,
        mapping: &GeneSetMapping,
        options: &KernelOptions,
        progress: &ProgressHandle,
    ) -> Result<String> {
        if mapping.is_empty() {
            return Err(GsaError::Kernel(
                "None of the submitted genes map to any pathway".to_string(),
            ));
        }

        let (statistics, fold_changes) = self.gene_statistics(prepared);
        let background_mean = mean(&statistics);
        let background_sd = standard_deviation(&statistics).max(1e-6);

        let admitted: Vec<_> = mapping
            .pathways()
            .iter()
            .filter(|pathway| options.admits(&pathway.id, &pathway.name, pathway.rows.len()))
            .collect();
        if admitted.is_empty() {
            return Err(GsaError::Kernel(
                "No pathway passes the configured size filters".to_string(),
            ));
        }

        let total = admitted.len();
        let mut rows = Vec::with_capacity(total);
        let mut p_values = Vec::with_capacity(total);

        for (index, pathway) in admitted.iter().enumerate() {
            let (pathway_mean, member_fc) = if self.weighted {
                let weights: Vec<f64> = pathway
                    .rows
                    .iter()
                    .map(|&row| 1.0 / (mapping.row_frequency(row).max(1) as f64).sqrt())
                    .collect();
                let weight_sum: f64 = weights.iter().sum();
                let stat: f64 = pathway
                    .rows
                    .iter()
                    .zip(&weights)
                    .map(|(&row, weight)| statistics[row] * weight)
                    .sum::<f64>()
                    / weight_sum;
                let fc: f64 = pathway
                    .rows
                    .iter()
                    .zip(&weights)
                    .map(|(&row, weight)| fold_changes[row] * weight)
                    .sum::<f64>()
                    / weight_sum;
                (stat, fc)
            } else {
                let member_stats: Vec<f64> =
                    pathway.rows.iter().map(|&row| statistics[row]).collect();
                let member_fcs: Vec<f64> =
                    pathway.rows.iter().map(|&row| fold_changes[row]).collect();
                (mean(&member_stats), mean(&member_fcs))
            };

            let size = pathway.rows.len();
            let z = (pathway_mean - background_mean) / background_sd * (size as f64).sqrt();
            let p = two_sided_p(z);

            p_values.push(p);
            rows.push((
                pathway.id.clone(),
                pathway.name.clone(),
                if member_fc >= 0.0 { "up" } else { "down" },
                p,
                size,
                member_fc,
            ));

            if (index + 1) % PROGRESS_CHUNK == 0 {
                progress.update(
                    (index + 1) as f64 / total as f64,
                    &format!("Analysed {} of {} pathways", index + 1, total),
                );
            }
        }

        let fdrs = benjamini_hochberg(&p_values);
        let mut indices: Vec<usize> = (0..rows.len()).collect();
        indices.sort_by(|&a, &b| {
            p_values[a]
                .partial_cmp(&p_values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut table = String::from("Pathway\tName\tDirection\tFDR\tPValue\tNGenes\tAvgFoldChange\n");
        for index in indices {
            let (id, name, direction, p, size, fc) = &rows[index];
            table.push_str(&format!(
                "{}\t{}\t{}\t{:.6}\t{:.6}\t{}\t{:.4}\n",
                id, name, direction, fdrs[index], p, size, fc
            ));
        }

        progress.update(1.0, "Pathway analysis done");
        Ok(table)
    }

    fn gene_fold_changes(&self, prepared: &PreparedDataset) -> Option<String> {
        let (statistics, fold_changes) = self.gene_statistics(prepared);
        let p_values: Vec<f64> = statistics.iter().map(|&t| two_sided_p(t)).collect();
        let adjusted = benjamini_hochberg(&p_values);

        let mut table = String::from("Identifier\tlogFC\tadj.P.Val\n");
        for (row, identifier) in prepared.matrix.identifiers().iter().enumerate() {
            table.push_str(&format!(
                "{}\t{:.4}\t{:.6}\n",
                identifier, fold_changes[row], adjusted[row]
            ));
        }
        Some(table)
    }
}
