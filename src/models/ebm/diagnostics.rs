//! Convergence diagnostics for the log-likelihood trace.

use num_traits::ToPrimitive;

use crate::utils::usize_to_f64;

use super::sampler::McmcTrace;
use super::types::AcceptanceStats;

/// Lag-`lag` autocorrelation of a scalar series.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }

    let mean = series.iter().sum::<f64>() / usize_to_f64(series.len());
    let denominator: f64 = series
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum();
    if denominator <= 0.0 {
        return 0.0;
    }

    let numerator: f64 = series
        .iter()
        .zip(&series[lag..])
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum();
    numerator / denominator
}

/// Effective sample size via truncation at the first non-positive
/// autocorrelation.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return usize_to_f64(n);
    }

    let rho_sum: f64 = (1..n)
        .map(|lag| autocorrelation(series, lag))
        .take_while(|rho| *rho > 0.0)
        .sum();
    usize_to_f64(n) / 2.0f64.mul_add(rho_sum, 1.0).max(1.0)
}

/// Scalar summary statistics for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

#[must_use]
fn summarize_series(values: &[f64]) -> SeriesSummary {
    if values.is_empty() {
        return SeriesSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    SeriesSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
    }
}

#[must_use]
fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let last = sorted_values.len() - 1;
    let position = probability.clamp(0.0, 1.0) * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// Summary diagnostics for one chain's log-likelihood series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraceDiagnostics {
    pub entries: usize,
    pub acceptance_rate: f64,
    pub lag1_autocorrelation: f64,
    pub effective_sample_size: f64,
    pub log_likelihood: SeriesSummary,
}

/// Diagnostics over the post-burn-in log-likelihood series.
#[must_use]
pub fn summarize_trace(
    trace: &McmcTrace,
    burn_in: usize,
    acceptance: AcceptanceStats,
) -> TraceDiagnostics {
    let series: Vec<f64> = trace
        .entries()
        .iter()
        .skip(burn_in)
        .map(|entry| entry.log_likelihood)
        .collect();
    TraceDiagnostics {
        entries: series.len(),
        acceptance_rate: acceptance.rate(),
        lag1_autocorrelation: autocorrelation(&series, 1),
        effective_sample_size: effective_sample_size(&series),
        log_likelihood: summarize_series(&series),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn autocorrelation_of_constant_series_is_zero() {
        assert_relative_eq!(autocorrelation(&[2.0; 10], 1), 0.0);
    }

    #[test]
    fn autocorrelation_of_alternating_series_is_negative() {
        let series: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(autocorrelation(&series, 1) < 0.0);
    }

    #[test]
    fn effective_sample_size_shrinks_for_sticky_series() {
        let independent: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let sticky: Vec<f64> = (0..40).map(|i| usize_to_f64(i / 10)).collect();
        assert!(effective_sample_size(&sticky) < effective_sample_size(&independent));
    }

    #[test]
    fn effective_sample_size_of_short_series_is_its_length() {
        assert_relative_eq!(effective_sample_size(&[1.0]), 1.0);
        assert_relative_eq!(effective_sample_size(&[]), 0.0);
    }

    #[test]
    fn series_summary_orders_quantiles() {
        let values: Vec<f64> = (0..101).map(usize_to_f64).collect();
        let summary = summarize_series(&values);
        assert_relative_eq!(summary.mean, 50.0);
        assert_relative_eq!(summary.q50, 50.0);
        assert_relative_eq!(summary.q025, 2.5);
        assert_relative_eq!(summary.q975, 97.5);
        assert!(summary.q025 < summary.q50 && summary.q50 < summary.q975);
    }

    #[test]
    fn empty_series_summary_is_default() {
        assert_eq!(summarize_series(&[]), SeriesSummary::default());
    }
}
