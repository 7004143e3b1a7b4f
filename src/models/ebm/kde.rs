//! Weighted Gaussian kernel density estimation for the non-parametric
//! biomarker state densities.

use crate::utils::{mean_abs_difference, usize_to_f64};

const MIN_BANDWIDTH: f64 = 1.0e-6;
const MIN_DENSITY: f64 = 1.0e-10;
const INV_SQRT_TAU: f64 = 0.398_942_280_401_432_7;

/// Weighted kernel density estimate over a fixed measurement sample.
///
/// Weights are normalized at construction; a uniform weighting is used
/// when none is supplied or the supplied weights sum to zero. The
/// bandwidth follows Silverman's rule with a floored sample standard
/// deviation so repeated values never collapse the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedKde {
    samples: Vec<f64>,
    weights: Vec<f64>,
    bandwidth: f64,
}

impl WeightedKde {
    #[must_use]
    pub fn new(samples: Vec<f64>, weights: Option<Vec<f64>>) -> Self {
        let n = samples.len();
        let mut weights = match weights {
            Some(weights) if weights.len() == n => weights,
            _ => vec![1.0; n],
        };
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            for weight in &mut weights {
                *weight /= total;
            }
        } else if n > 0 {
            let uniform = 1.0 / usize_to_f64(n);
            for weight in &mut weights {
                *weight = uniform;
            }
        }

        let bandwidth = silverman_bandwidth(&samples);
        Self {
            samples,
            weights,
            bandwidth,
        }
    }

    #[must_use]
    pub fn density(&self, value: f64) -> f64 {
        let mut total = 0.0;
        for (sample, weight) in self.samples.iter().zip(&self.weights) {
            let u = (value - sample) / self.bandwidth;
            total += weight * INV_SQRT_TAU * (-0.5 * u * u).exp() / self.bandwidth;
        }
        total
    }

    /// Log density, floored so downstream log-space sums stay finite.
    #[must_use]
    pub fn log_density(&self, value: f64) -> f64 {
        self.density(value).max(MIN_DENSITY).ln()
    }

    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub const fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Mean absolute difference between this estimate's weights and a
    /// candidate (normalized) weight vector.
    #[must_use]
    pub fn weight_shift(&self, candidate: &[f64]) -> f64 {
        mean_abs_difference(&self.weights, candidate)
    }
}

fn silverman_bandwidth(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n == 0 {
        return MIN_BANDWIDTH;
    }
    let n_f = usize_to_f64(n);
    let mean = samples.iter().sum::<f64>() / n_f;
    let variance = samples
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n_f;
    let sigma = variance.sqrt().max(MIN_BANDWIDTH);
    (sigma * (4.0 / (3.0 * n_f)).powf(0.2)).max(MIN_BANDWIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_are_normalized() {
        let kde = WeightedKde::new(vec![0.0, 1.0, 2.0], Some(vec![2.0, 2.0, 4.0]));
        let total: f64 = kde.weights().iter().sum();
        assert_relative_eq!(total, 1.0);
        assert_relative_eq!(kde.weights()[2], 0.5);
    }

    #[test]
    fn zero_weight_sum_falls_back_to_uniform() {
        let kde = WeightedKde::new(vec![0.0, 1.0], Some(vec![0.0, 0.0]));
        assert_relative_eq!(kde.weights()[0], 0.5);
        assert_relative_eq!(kde.weights()[1], 0.5);
    }

    #[test]
    fn density_integrates_mass_near_samples() {
        let kde = WeightedKde::new(vec![0.0; 16], None);
        assert!(kde.density(0.0) > kde.density(5.0));
    }

    #[test]
    fn log_density_is_finite_far_from_support() {
        let kde = WeightedKde::new(vec![0.0, 0.1, -0.1], None);
        let far = kde.log_density(1.0e6);
        assert!(far.is_finite());
        assert_relative_eq!(far, 1.0e-10_f64.ln());
    }

    #[test]
    fn degenerate_sample_keeps_positive_bandwidth() {
        let kde = WeightedKde::new(vec![3.0, 3.0, 3.0], None);
        assert!(kde.bandwidth() > 0.0);
        assert!(kde.log_density(3.0).is_finite());
    }

    #[test]
    fn weight_shift_measures_mean_absolute_change() {
        let kde = WeightedKde::new(vec![0.0, 1.0], Some(vec![1.0, 1.0]));
        assert_relative_eq!(kde.weight_shift(&[0.5, 0.5]), 0.0);
        assert_relative_eq!(kde.weight_shift(&[1.0, 0.0]), 0.5);
    }
}
