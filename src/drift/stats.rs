//! Statistical tests and regression quality measures

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Two-sample Kolmogorov-Smirnov statistic over NaN-free sorted samples
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }
    d
}

/// Below this the alternating series converges too slowly and the
/// Jacobi-transformed CDF series is used instead
const KOLMOGOROV_SWITCH: f64 = 1.18;

/// Asymptotic Kolmogorov distribution survival function
fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < KOLMOGOROV_SWITCH {
        // CDF = sqrt(2π)/λ · Σ exp(-(2k-1)²π²/(8λ²))
        let base = -std::f64::consts::PI.powi(2) / (8.0 * lambda * lambda);
        let mut sum = 0.0;
        for k in 1..=100 {
            let odd = (2 * k - 1) as f64;
            let term = (odd * odd * base).exp();
            sum += term;
            if term <= 1e-16 * sum.max(f64::MIN_POSITIVE) {
                break;
            }
        }
        let cdf = (2.0 * std::f64::consts::PI).sqrt() / lambda * sum;
        return (1.0 - cdf).clamp(0.0, 1.0);
    }

    // SF = 2 Σ (-1)^(k-1) exp(-2k²λ²); at λ >= 1.18 a handful of terms suffice
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * (-2.0 * kf * kf * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-16 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// KS test p-value; NaN values are ignored
///
/// Returns 1.0 (no evidence of drift) when either sample is empty.
pub fn ks_p_value(reference: &[f64], current: &[f64]) -> f64 {
    let a = finite_sorted(reference);
    let b = finite_sorted(current);
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }

    let d = ks_statistic(&a, &b);
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();
    kolmogorov_sf((en + 0.12 + 0.11 / en) * d)
}

/// Chi-square goodness-of-fit p-value of current category counts against
/// reference frequencies
///
/// A category seen only in the current sample yields 0.0; fewer than two
/// categories yields 1.0.
pub fn chi_square_p_value(reference: &[f64], current: &[f64]) -> Result<f64> {
    let ref_counts = category_counts(reference);
    let cur_counts = category_counts(current);
    let ref_total: f64 = ref_counts.values().sum();
    let cur_total: f64 = cur_counts.values().sum();
    if ref_total == 0.0 || cur_total == 0.0 {
        return Ok(1.0);
    }
    if cur_counts.keys().any(|k| !ref_counts.contains_key(k)) {
        return Ok(0.0);
    }
    if ref_counts.len() < 2 {
        return Ok(1.0);
    }

    let statistic: f64 = ref_counts
        .iter()
        .map(|(category, &count)| {
            let expected = count / ref_total * cur_total;
            let observed = cur_counts.get(category).copied().unwrap_or(0.0);
            (observed - expected).powi(2) / expected
        })
        .sum();

    let dist = ChiSquared::new((ref_counts.len() - 1) as f64)
        .map_err(|e| PipelineError::DataError(format!("chi-square: {}", e)))?;
    Ok((1.0 - dist.cdf(statistic)).clamp(0.0, 1.0))
}

/// Counts keyed by the category's bit pattern
fn category_counts(values: &[f64]) -> BTreeMap<u64, f64> {
    let mut counts = BTreeMap::new();
    for v in values.iter().filter(|v| !v.is_nan()) {
        // fold -0.0 into 0.0
        let key = if *v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        *counts.entry(key).or_insert(0.0) += 1.0;
    }
    counts
}

/// Linear-interpolated quantile of sorted data
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Mean and population standard deviation of one error segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentStats {
    pub mean_error: f64,
    pub std_error: f64,
}

impl SegmentStats {
    fn of(errors: &[f64]) -> Self {
        if errors.is_empty() {
            return Self {
                mean_error: 0.0,
                std_error: 0.0,
            };
        }
        Self {
            mean_error: errors.mean(),
            std_error: errors.population_std_dev(),
        }
    }
}

/// Error segments split at the 5% and 95% error quantiles
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Underperformance {
    pub majority: SegmentStats,
    pub underestimation: SegmentStats,
    pub overestimation: SegmentStats,
}

/// Regression quality of predictions against targets
///
/// Errors are `prediction - target`. Rows where either value is NaN are
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionQuality {
    pub r2_score: f64,
    pub rmse: f64,
    pub mean_error: f64,
    pub mean_abs_error: f64,
    /// Percent; rows with a zero target are excluded
    pub mean_abs_perc_error: f64,
    pub abs_error_max: f64,
    pub underperformance: Underperformance,
}

impl RegressionQuality {
    pub fn compute(target: &[f64], prediction: &[f64]) -> Result<Self> {
        if target.len() != prediction.len() {
            return Err(PipelineError::DataError(format!(
                "{} targets for {} predictions",
                target.len(),
                prediction.len()
            )));
        }

        let pairs: Vec<(f64, f64)> = target
            .iter()
            .zip(prediction)
            .filter(|(t, p)| !t.is_nan() && !p.is_nan())
            .map(|(&t, &p)| (t, p))
            .collect();
        if pairs.is_empty() {
            return Err(PipelineError::DataError(
                "no labeled rows to score".to_string(),
            ));
        }

        let n = pairs.len() as f64;
        let errors: Vec<f64> = pairs.iter().map(|(t, p)| p - t).collect();
        let target_mean = pairs.iter().map(|(t, _)| t).sum::<f64>() / n;

        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let ss_tot: f64 = pairs.iter().map(|(t, _)| (t - target_mean).powi(2)).sum();
        let r2_score = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        let perc: Vec<f64> = pairs
            .iter()
            .filter(|(t, _)| *t != 0.0)
            .map(|(t, p)| ((p - t) / t).abs() * 100.0)
            .collect();
        let mean_abs_perc_error = if perc.is_empty() {
            0.0
        } else {
            perc.iter().sum::<f64>() / perc.len() as f64
        };

        Ok(Self {
            r2_score,
            rmse: (ss_res / n).sqrt(),
            mean_error: errors.iter().sum::<f64>() / n,
            mean_abs_error: errors.iter().map(|e| e.abs()).sum::<f64>() / n,
            mean_abs_perc_error,
            abs_error_max: errors.iter().map(|e| e.abs()).fold(0.0, f64::max),
            underperformance: segments(&errors),
        })
    }
}

fn segments(errors: &[f64]) -> Underperformance {
    let sorted = finite_sorted(errors);
    let q05 = quantile(&sorted, 0.05);
    let q95 = quantile(&sorted, 0.95);

    let under: Vec<f64> = errors.iter().copied().filter(|e| *e <= q05).collect();
    let over: Vec<f64> = errors.iter().copied().filter(|e| *e >= q95).collect();
    let majority: Vec<f64> = errors.iter().copied().filter(|e| *e > q05 && *e < q95).collect();

    Underperformance {
        majority: SegmentStats::of(&majority),
        underestimation: SegmentStats::of(&under),
        overestimation: SegmentStats::of(&over),
    }
}

/// Share of NaN cells across the given columns
pub fn missing_share(columns: &[Vec<f64>]) -> f64 {
    let total: usize = columns.iter().map(Vec::len).sum();
    if total == 0 {
        return 0.0;
    }
    let missing = columns.iter().flatten().filter(|v| v.is_nan()).count();
    missing as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ks_identical_samples() {
        let a: Vec<f64> = (0..200).map(|i| i as f64).collect();
        assert_relative_eq!(ks_p_value(&a, &a), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ks_shifted_samples() {
        let a: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..200).map(|i| i as f64 + 150.0).collect();
        assert!(ks_p_value(&a, &b) < 0.05);
    }

    #[test]
    fn test_ks_discrete_near_identical_samples() {
        // a year of hourly values with one hour missing against one week
        let mut reference: Vec<f64> = (0..365).flat_map(|_| (0..24).map(|h| h as f64)).collect();
        reference.remove(0);
        let current: Vec<f64> = (0..7).flat_map(|_| (0..24).map(|h| h as f64)).collect();

        let p = ks_p_value(&reference, &current);
        assert!(p > 0.99, "p = {}", p);
    }

    #[test]
    fn test_kolmogorov_sf_small_lambda() {
        for i in 0..=50 {
            let lambda = 1e-3 + i as f64 * 1e-3;
            assert_relative_eq!(kolmogorov_sf(lambda), 1.0, epsilon = 1e-12);
        }
        assert_eq!(kolmogorov_sf(0.0), 1.0);
    }

    #[test]
    fn test_kolmogorov_sf_known_values() {
        assert_relative_eq!(kolmogorov_sf(0.5), 0.9639, epsilon = 1e-4);
        assert_relative_eq!(kolmogorov_sf(1.0), 0.2700, epsilon = 1e-4);
        assert_relative_eq!(kolmogorov_sf(1.358), 0.0500, epsilon = 1e-3);
        assert!(kolmogorov_sf(3.0) < 1e-6);
    }

    #[test]
    fn test_kolmogorov_sf_continuous_and_decreasing() {
        assert_relative_eq!(
            kolmogorov_sf(KOLMOGOROV_SWITCH - 1e-9),
            kolmogorov_sf(KOLMOGOROV_SWITCH),
            epsilon = 1e-7
        );
        let grid: Vec<f64> = (1..300).map(|i| kolmogorov_sf(i as f64 * 0.01)).collect();
        assert!(grid.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_ks_statistic_disjoint() {
        assert_relative_eq!(ks_statistic(&[1.0, 2.0], &[3.0, 4.0]), 1.0);
    }

    #[test]
    fn test_chi_square_same_frequencies() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert_relative_eq!(chi_square_p_value(&a, &b).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_chi_square_new_category() {
        assert_eq!(chi_square_p_value(&[0.0, 1.0], &[2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_regression_quality() {
        let target = [10.0, 20.0, 0.0, 40.0];
        let prediction = [12.0, 18.0, 1.0, 40.0];
        let q = RegressionQuality::compute(&target, &prediction).unwrap();

        assert_relative_eq!(q.mean_error, 0.25);
        assert_relative_eq!(q.mean_abs_error, 1.25);
        assert_relative_eq!(q.rmse, (9.0f64 / 4.0).sqrt());
        assert_relative_eq!(q.abs_error_max, 2.0);
        // zero target excluded: (20% + 10% + 0%) / 3
        assert_relative_eq!(q.mean_abs_perc_error, 10.0);
    }

    #[test]
    fn test_regression_quality_needs_labels() {
        assert!(RegressionQuality::compute(&[f64::NAN], &[1.0]).is_err());
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_relative_eq!(quantile(&[0.0, 10.0], 0.05), 0.5);
        assert_relative_eq!(quantile(&[0.0, 10.0], 0.95), 9.5);
    }

    #[test]
    fn test_missing_share() {
        let cols = vec![vec![1.0, f64::NAN], vec![f64::NAN, 2.0]];
        assert_relative_eq!(missing_share(&cols), 0.5);
    }
}
