//! Expression normalization ahead of the statistical kernels.
//!
//! Count-like data (RNA-seq counts, spectral counts) takes the discrete
//! path: library-size scaling with a method-specific scale factor, then
//! log2(cpm + 1). Continuous data (intensities, normalized arrays,
//! translational efficiencies) is adjusted column-wise.

use gsa_common::matrix::ExpressionMatrix;
use gsa_common::models::DataType;

use super::stats::mean;
use super::{ContinuousNorm, DiscreteNorm, NormalizationConfig};

/// Normalize a decoded matrix according to its data type
pub fn normalize(
    matrix: &ExpressionMatrix,
    data_type: DataType,
    config: &NormalizationConfig,
) -> ExpressionMatrix {
    match data_type {
        DataType::RnaseqCounts | DataType::ProteomicsSc => {
            normalize_discrete(matrix, config.discrete)
        }
        _ => normalize_continuous(matrix, config.continuous),
    }
}

fn normalize_discrete(matrix: &ExpressionMatrix, method: DiscreteNorm) -> ExpressionMatrix {
    let n_samples = matrix.n_samples();
    let factors = match method {
        DiscreteNorm::None => vec![1.0; n_samples],
        DiscreteNorm::UpperQuartile => upper_quartile_factors(matrix),
        DiscreteNorm::Rle => rle_factors(matrix),
        DiscreteNorm::Tmm => tmm_factors(matrix),
    };

    let library_sizes: Vec<f64> = (0..n_samples)
        .map(|column| matrix.column(column).iter().sum::<f64>().max(1.0))
        .collect();

    let values = (0..matrix.n_rows())
        .map(|row| {
            (0..n_samples)
                .map(|column| {
                    let scaled = matrix.value(row, column)
                        / (library_sizes[column] * factors[column])
                        * 1e6;
                    (scaled + 1.0).log2()
                })
                .collect()
        })
        .collect();

    ExpressionMatrix::from_parts(
        matrix.identifiers().to_vec(),
        matrix.samples().to_vec(),
        values,
    )
}

fn normalize_continuous(matrix: &ExpressionMatrix, method: ContinuousNorm) -> ExpressionMatrix {
    match method {
        ContinuousNorm::None => matrix.clone(),
        ContinuousNorm::Scale => center_columns(matrix, median),
        ContinuousNorm::CyclicLoess => center_columns(matrix, mean),
        ContinuousNorm::Quantile => quantile_normalize(matrix),
    }
}

fn center_columns(matrix: &ExpressionMatrix, center: fn(&[f64]) -> f64) -> ExpressionMatrix {
    let offsets: Vec<f64> = (0..matrix.n_samples())
        .map(|column| center(&matrix.column(column)))
        .collect();

    let values = (0..matrix.n_rows())
        .map(|row| {
            (0..matrix.n_samples())
                .map(|column| matrix.value(row, column) - offsets[column])
                .collect()
        })
        .collect();

    ExpressionMatrix::from_parts(
        matrix.identifiers().to_vec(),
        matrix.samples().to_vec(),
        values,
    )
}

/// Replace each column by the row-rank average over all columns
fn quantile_normalize(matrix: &ExpressionMatrix) -> ExpressionMatrix {
    let n_rows = matrix.n_rows();
    let n_samples = matrix.n_samples();
    if n_rows == 0 || n_samples == 0 {
        return matrix.clone();
    }

    // Per column: row indices sorted by value
    let sorted_rows: Vec<Vec<usize>> = (0..n_samples)
        .map(|column| {
            let values = matrix.column(column);
            let mut rows: Vec<usize> = (0..n_rows).collect();
            rows.sort_by(|&a, &b| {
                values[a]
                    .partial_cmp(&values[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            rows
        })
        .collect();

    // Mean across columns at each rank
    let rank_means: Vec<f64> = (0..n_rows)
        .map(|rank| {
            let sum: f64 = (0..n_samples)
                .map(|column| matrix.value(sorted_rows[column][rank], column))
                .sum();
            sum / n_samples as f64
        })
        .collect();

    let mut values = vec![vec![0.0; n_samples]; n_rows];
    for column in 0..n_samples {
        for (rank, &row) in sorted_rows[column].iter().enumerate() {
            values[row][column] = rank_means[rank];
        }
    }

    ExpressionMatrix::from_parts(
        matrix.identifiers().to_vec(),
        matrix.samples().to_vec(),
        values,
    )
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn percentile(values: &[f64], fraction: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[index]
}

/// Geometric-mean scaling so the factors multiply to one
fn balance(mut factors: Vec<f64>) -> Vec<f64> {
    let log_mean = mean(
        &factors
            .iter()
            .map(|f| f.max(1e-9).ln())
            .collect::<Vec<f64>>(),
    );
    let geometric_mean = log_mean.exp();
    for factor in &mut factors {
        *factor = (*factor / geometric_mean).max(1e-9);
    }
    factors
}

fn upper_quartile_factors(matrix: &ExpressionMatrix) -> Vec<f64> {
    let factors = (0..matrix.n_samples())
        .map(|column| {
            let positive: Vec<f64> = matrix
                .column(column)
                .into_iter()
                .filter(|&v| v > 0.0)
                .collect();
            let quartile = percentile(&positive, 0.75);
            let library: f64 = matrix.column(column).iter().sum::<f64>().max(1.0);
            if quartile > 0.0 {
                quartile / library
            } else {
                1.0
            }
        })
        .collect();
    balance(factors)
}

fn rle_factors(matrix: &ExpressionMatrix) -> Vec<f64> {
    // Per-row geometric mean as the reference sample
    let references: Vec<f64> = (0..matrix.n_rows())
        .map(|row| {
            let values = matrix.row(row);
            if values.iter().any(|&v| v <= 0.0) {
                0.0
            } else {
                mean(&values.iter().map(|v| v.ln()).collect::<Vec<f64>>()).exp()
            }
        })
        .collect();

    let factors = (0..matrix.n_samples())
        .map(|column| {
            let ratios: Vec<f64> = (0..matrix.n_rows())
                .filter(|&row| references[row] > 0.0 && matrix.value(row, column) > 0.0)
                .map(|row| matrix.value(row, column) / references[row])
                .collect();
            if ratios.is_empty() {
                1.0
            } else {
                median(&ratios)
            }
        })
        .collect();
    balance(factors)
}

fn tmm_factors(matrix: &ExpressionMatrix) -> Vec<f64> {
    let reference = 0;
    let factors = (0..matrix.n_samples())
        .map(|column| {
            if column == reference {
                return 1.0;
            }
            let mut log_ratios: Vec<f64> = (0..matrix.n_rows())
                .filter(|&row| {
                    matrix.value(row, column) > 0.0 && matrix.value(row, reference) > 0.0
                })
                .map(|row| (matrix.value(row, column) / matrix.value(row, reference)).log2())
                .collect();
            if log_ratios.is_empty() {
                return 1.0;
            }
            log_ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            // Trim 20% of the extreme ratios on each side
            let trim = log_ratios.len() / 5;
            let trimmed = &log_ratios[trim..log_ratios.len() - trim];
            if trimmed.is_empty() {
                1.0
            } else {
                mean(trimmed).exp2()
            }
        })
        .collect();
    balance(factors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> ExpressionMatrix {
        ExpressionMatrix::parse(
            "\tS1\tS2\tS3\nGENE1\t100\t200\t50\nGENE2\t50\t100\t25\nGENE3\t10\t20\t5",
        )
        .unwrap()
    }

    #[test]
    fn test_discrete_normalization_equalizes_depth() {
        // S2 is exactly twice S1, S3 half of it: after library scaling
        // every sample should look identical
        let config = NormalizationConfig {
            discrete: DiscreteNorm::None,
            continuous: ContinuousNorm::None,
            sample_groups: None,
        };
        let normalized = normalize(&counts(), DataType::RnaseqCounts, &config);

        for row in 0..normalized.n_rows() {
            let values = normalized.row(row);
            assert!((values[0] - values[1]).abs() < 1e-9);
            assert!((values[0] - values[2]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tmm_factors_balance_to_one() {
        let factors = tmm_factors(&counts());
        let product: f64 = factors.iter().product();
        assert!((product - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_median_centering() {
        let matrix = ExpressionMatrix::parse("\tS1\tS2\nGENE1\t1\t10\nGENE2\t3\t12\nGENE3\t5\t14")
            .unwrap();
        let centered = center_columns(&matrix, median);
        assert_eq!(centered.value(1, 0), 0.0);
        assert_eq!(centered.value(1, 1), 0.0);
    }

    #[test]
    fn test_quantile_normalization_aligns_distributions() {
        let matrix =
            ExpressionMatrix::parse("\tS1\tS2\nGENE1\t1\t100\nGENE2\t2\t200\nGENE3\t3\t300")
                .unwrap();
        let normalized = quantile_normalize(&matrix);

        // Both columns share the same sorted values afterwards
        let mut a = normalized.column(0);
        let mut b = normalized.column(1);
        a.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_continuous_data_ignores_discrete_method() {
        let matrix = ExpressionMatrix::parse("\tS1\tS2\nGENE1\t1.5\t2.5").unwrap();
        let config = NormalizationConfig {
            discrete: DiscreteNorm::Tmm,
            continuous: ContinuousNorm::None,
            sample_groups: None,
        };
        let normalized = normalize(&matrix, DataType::ProteomicsInt, &config);
        assert_eq!(normalized, matrix);
    }
}
