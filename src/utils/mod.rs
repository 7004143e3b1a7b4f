//! # Utilities
//!
//! Shared numeric helpers for sample and weighted summary statistics.

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Sample mean and (population) variance.
///
/// Returns `None` for fewer than two values, where the variance is
/// undefined for the purposes of a two-component fit.
#[must_use]
pub fn sample_mean_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
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
    Some((mean, variance))
}

/// Weighted mean and variance with an effective-support guard.
///
/// Returns `None` when fewer than two values carry non-negligible weight
/// or the total weight vanishes.
#[must_use]
pub fn weighted_mean_variance(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    debug_assert_eq!(values.len(), weights.len());
    const WEIGHT_FLOOR: f64 = 1.0e-12;

    let total: f64 = weights.iter().sum();
    let support = weights.iter().filter(|w| **w > WEIGHT_FLOOR).count();
    if support < 2 || total <= WEIGHT_FLOOR {
        return None;
    }

    let mean = values
        .iter()
        .zip(weights)
        .map(|(value, weight)| value * weight)
        .sum::<f64>()
        / total;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(value, weight)| {
            let centered = value - mean;
            weight * centered * centered
        })
        .sum::<f64>()
        / total;
    Some((mean, variance))
}

/// Mean absolute difference between two equally long weight vectors.
#[must_use]
pub fn mean_abs_difference(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .sum::<f64>()
        / usize_to_f64(a.len())
}
