//! Dataset conversion and filtering ahead of the kernel run.
//!
//! Matrices are decoded from their wire form, Ribo-seq datasets are
//! collapsed into translational efficiencies, the design is checked
//! against the matrix shape, and rows are filtered by mapping status and
//! missing-value share.

use std::collections::HashMap;

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::{DataType, Dataset, Design};
use gsa_common::{GsaError, Result};

/// Decode one dataset's matrix, applying the Ribo-seq transformation
pub fn convert_dataset(dataset: &Dataset) -> Result<ExpressionMatrix> {
    let matrix = ExpressionMatrix::parse(&dataset.data).map_err(|err| {
        GsaError::Kernel(format!(
            "Failed to convert dataset '{}': {}",
            dataset.name, err
        ))
    })?;

    match dataset.data_type {
        DataType::RiboSeq => translational_efficiency(dataset, matrix),
        _ => Ok(matrix),
    }
}

/// Collapse a Ribo-seq matrix into per-sample translational efficiencies.
///
/// The matrix carries two column blocks in design-sample order: RNA-seq
/// counts first, Ribo-seq counts second. The efficiency is
/// `log2((ribo + 1) / (rna + 1))` per gene and sample.
fn translational_efficiency(
    dataset: &Dataset,
    matrix: ExpressionMatrix,
) -> Result<ExpressionMatrix> {
    let samples = dataset
        .design
        .as_ref()
        .map(|design| design.samples.clone())
        .unwrap_or_default();

    if samples.is_empty() || matrix.n_samples() != samples.len() * 2 {
        return Err(GsaError::Kernel(format!(
            "Failed to convert dataset '{}': Ribo-seq data requires an RNA and a Ribo column \
             block per sample.",
            dataset.name
        )));
    }

    let n = samples.len();
    let values = (0..matrix.n_rows())
        .map(|row| {
            (0..n)
                .map(|sample| {
                    let rna = matrix.value(row, sample);
                    let ribo = matrix.value(row, sample + n);
                    ((ribo + 1.0) / (rna + 1.0)).log2()
                })
                .collect()
        })
        .collect();

    Ok(ExpressionMatrix::from_parts(
        matrix.identifiers().to_vec(),
        samples,
        values,
    ))
}

/// Check that the design structure matches the decoded matrix
pub fn validate_design(dataset: &Dataset, matrix: &ExpressionMatrix) -> Result<()> {
    let Some(design) = &dataset.design else {
        return Ok(());
    };

    if design.samples.len() != design.analysis_group.len() {
        return Err(GsaError::Validation(format!(
            "Failed to convert dataset '{}'. 'analysisGroup' must assign one group per sample.",
            dataset.name
        )));
    }

    if design.samples.len() != matrix.n_samples() {
        return Err(GsaError::Validation(format!(
            "Failed to convert dataset '{}'. The experimental design describes {} samples but \
             the expression matrix contains {} columns.",
            dataset.name,
            design.samples.len(),
            matrix.n_samples()
        )));
    }

    for group in [&design.comparison.group1, &design.comparison.group2] {
        if !design.analysis_group.iter().any(|g| g == group) {
            return Err(GsaError::Validation(format!(
                "Failed to convert dataset '{}'. Comparison group '{}' does not occur in \
                 'analysisGroup'.",
                dataset.name, group
            )));
        }
    }

    Ok(())
}

/// Column indices assigned to each comparison group
pub fn group_columns(design: &Design) -> (Vec<usize>, Vec<usize>) {
    let mut group1 = Vec::new();
    let mut group2 = Vec::new();
    for (column, group) in design.analysis_group.iter().enumerate() {
        if *group == design.comparison.group1 {
            group1.push(column);
        } else if *group == design.comparison.group2 {
            group2.push(column);
        }
    }
    (group1, group2)
}

/// Remove unmapped rows and rows with too many missing values.
///
/// With a design the missing-value share is computed per comparison
/// group and the smaller share decides; without one the share is taken
/// across all samples.
pub fn filter_matrix(
    dataset_name: &str,
    matrix: &ExpressionMatrix,
    design: Option<&Design>,
    identifier_mappings: &HashMap<String, Vec<String>>,
    max_missing_values: f64,
) -> Result<ExpressionMatrix> {
    let mapped_rows: Vec<usize> = (0..matrix.n_rows())
        .filter(|&row| identifier_mappings.contains_key(&matrix.identifiers()[row]))
        .collect();
    tracing::debug!(
        dataset = dataset_name,
        kept = mapped_rows.len(),
        total = matrix.n_rows(),
        "Keeping mapped identifiers"
    );
    let matrix = matrix.retain_rows(&mapped_rows);

    let missing_share = |row: &[f64], columns: &[usize]| -> f64 {
        if columns.is_empty() {
            return 1.0;
        }
        let missing = columns.iter().filter(|&&c| row[c] == 0.0).count();
        missing as f64 / columns.len() as f64
    };

    let kept: Vec<usize> = match design {
        Some(design) => {
            let (group1, group2) = group_columns(design);
            if group1.is_empty() || group2.is_empty() {
                return Err(GsaError::Validation(format!(
                    "Failed to filter dataset '{}'. Please ensure that both analysis groups \
                     have samples assigned to them.",
                    dataset_name
                )));
            }
            (0..matrix.n_rows())
                .filter(|&row| {
                    let values = matrix.row(row);
                    let share =
                        missing_share(values, &group1).min(missing_share(values, &group2));
                    share < max_missing_values
                })
                .collect()
        }
        None => {
            let all: Vec<usize> = (0..matrix.n_samples()).collect();
            (0..matrix.n_rows())
                .filter(|&row| missing_share(matrix.row(row), &all) < max_missing_values)
                .collect()
        }
    };

    if kept.is_empty() {
        return Err(GsaError::Validation(format!(
            "No identifiers left in dataset '{}' after filtering. Please adjust the \
             max_missing_values parameter.",
            dataset_name
        )));
    }

    Ok(matrix.retain_rows(&kept))
}
