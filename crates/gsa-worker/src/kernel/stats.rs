//! Small statistical helpers shared by the kernels.

/// Variance guard keeping test statistics finite on degenerate data
pub const VARIANCE_FLOOR: f64 = 0.05;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); zero for fewer than two values
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Welch-style t statistic between two groups
pub fn welch_t(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let var_a = standard_deviation(a).powi(2);
    let var_b = standard_deviation(b).powi(2);
    let se = (var_a / a.len() as f64 + var_b / b.len() as f64 + VARIANCE_FLOOR).sqrt();
    (mean(a) - mean(b)) / se
}

/// One-sample t statistic of paired differences against zero
pub fn paired_t(differences: &[f64]) -> f64 {
    if differences.is_empty() {
        return 0.0;
    }
    let sd = standard_deviation(differences);
    let se = (sd * sd / differences.len() as f64 + VARIANCE_FLOOR).sqrt();
    mean(differences) / se
}

/// Error function, Abramowitz & Stegun approximation 7.1.26
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Two-sided p-value for a standard-normal test statistic
pub fn two_sided_p(z: f64) -> f64 {
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Benjamini-Hochberg false discovery rates
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut adjusted = vec![0.0; n];
    let mut running_min = f64::INFINITY;
    for (rank, &index) in order.iter().enumerate().rev() {
        let value = p_values[index] * n as f64 / (rank + 1) as f64;
        running_min = running_min.min(value).min(1.0);
        adjusted[index] = running_min;
    }
    adjusted
}
