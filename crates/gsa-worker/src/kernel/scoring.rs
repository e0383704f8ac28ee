//! Single-sample scoring kernel (ssGSEA-style).
//!
//! Derives a pathway expression value per sample from rank-normalised
//! expression; no experimental design is required. The pathway table
//! keeps the mandatory columns and appends one score column per sample.

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::Dataset;
use gsa_common::{GsaError, Result};

use crate::genesets::GeneSetMapping;
use crate::progress::ProgressHandle;

use super::normalize::normalize;
use super::stats::{benjamini_hochberg, mean, paired_t, two_sided_p};
use super::{AnalysisKernel, KernelOptions, NormalizationConfig, PreparedDataset};

pub struct ScoringKernel;

impl ScoringKernel {
    /// Per-column ranks scaled to (0, 1]
    fn rank_columns(matrix: &ExpressionMatrix) -> Vec<Vec<f64>> {
        let n_rows = matrix.n_rows();
        let mut ranks = vec![vec![0.0; matrix.n_samples()]; n_rows];

        for column in 0..matrix.n_samples() {
            let values = matrix.column(column);
            let mut order: Vec<usize> = (0..n_rows).collect();
            order.sort_by(|&a, &b| {
                values[a]
                    .partial_cmp(&values[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (rank, &row) in order.iter().enumerate() {
                ranks[row][column] = (rank + 1) as f64 / n_rows as f64;
            }
        }
        ranks
    }
}

impl AnalysisKernel for ScoringKernel {
    fn uses_design(&self) -> bool {
        false
    }

    fn prepare(
        &self,
        dataset: &Dataset,
        matrix: ExpressionMatrix,
        config: &NormalizationConfig,
    ) -> Result<PreparedDataset> {
        Ok(PreparedDataset {
            name: dataset.name.clone(),
            matrix: normalize(&matrix, dataset.data_type, config),
            group1: Vec::new(),
            group2: Vec::new(),
            pairs: None,
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

        let matrix = &prepared.matrix;
        let ranks = Self::rank_columns(matrix);

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
            // Centered mean rank of the member genes, per sample
            let scores: Vec<f64> = (0..matrix.n_samples())
                .map(|column| {
                    let member_ranks: Vec<f64> =
                        pathway.rows.iter().map(|&row| ranks[row][column]).collect();
                    mean(&member_ranks) - 0.5
                })
                .collect();

            let p = two_sided_p(paired_t(&scores));
            let direction = if mean(&scores) >= 0.0 { "up" } else { "down" };

            p_values.push(p);
            rows.push((pathway.id.clone(), pathway.name.clone(), direction, p, scores));

            progress.update(
                (index + 1) as f64 / total as f64,
                &format!("Scored {} of {} pathways", index + 1, total),
            );
        }

        let fdrs = benjamini_hochberg(&p_values);
        let mut indices: Vec<usize> = (0..rows.len()).collect();
        indices.sort_by(|&a, &b| {
            p_values[a]
                .partial_cmp(&p_values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut table = String::from("Pathway\tName\tDirection\tFDR\tPValue");
        for sample in matrix.samples() {
            table.push('\t');
            table.push_str(sample);
        }
        table.push('\n');

        for index in indices {
            let (id, name, direction, p, scores) = &rows[index];
            table.push_str(&format!(
                "{}\t{}\t{}\t{:.6}\t{:.6}",
                id, name, direction, fdrs[index], p
            ));
            for score in scores {
                table.push_str(&format!("\t{:.4}", score));
            }
            table.push('\n');
        }

        Ok(table)
    }

    fn gene_fold_changes(&self, _prepared: &PreparedDataset) -> Option<String> {
        None
    }
}
