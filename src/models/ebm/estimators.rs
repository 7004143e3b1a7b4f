//! Parameter-update strategies.
//!
//! All five variants share one contract: given the stage posteriors
//! computed under the proposal and the previous accepted parameters,
//! re-estimate the theta/phi pair of every biomarker. A degenerate
//! partition (empty or singleton support for either state) falls back to
//! the previous accepted value for that biomarker and state only, so one
//! starved biomarker never corrupts the rest of the update.

use faer::Mat;
use log::debug;

use crate::input::EbmInput;
use crate::utils::{sample_mean_variance, usize_to_f64, weighted_mean_variance};

use super::kde::WeightedKde;
use super::order::BiomarkerOrder;
use super::params::{BiomarkerParams, StateDensity, ThetaPhi};
use super::priors::EbmPriorConfig;
use super::types::{Algorithm, EstimatorTuning};

const WEIGHT_FLOOR: f64 = 1.0e-12;

/// Result of one estimation pass.
#[derive(Debug, Clone)]
pub struct ParameterUpdate {
    pub theta_phi: ThetaPhi,
    /// Biomarker states that kept their previous parameters because the
    /// partition was degenerate.
    pub fallbacks: usize,
}

/// One interface, five implementations, selected by [`Algorithm`].
pub trait ParameterEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate;
}

/// Build the estimator configured by `algorithm`.
#[must_use]
pub fn build_estimator(
    algorithm: Algorithm,
    prior_config: EbmPriorConfig,
    tuning: EstimatorTuning,
) -> Box<dyn ParameterEstimator> {
    match algorithm {
        Algorithm::ConjugatePriors => Box::new(ConjugatePriorsEstimator {
            prior_mean_strength: prior_config.prior_mean_strength,
            prior_variance_dof: prior_config.prior_variance_dof,
        }),
        Algorithm::HardKmeans => Box::new(HardKmeansEstimator),
        Algorithm::Mle => Box::new(MleEstimator),
        Algorithm::Em => Box::new(EmEstimator {
            max_iterations: tuning.em_max_iterations,
            tolerance: tuning.em_tolerance,
        }),
        Algorithm::Kde => Box::new(KdeEstimator {
            weight_change_threshold: tuning.kde_weight_change_threshold,
        }),
    }
}

/// Soft per-participant weights for one biomarker's two states.
///
/// A healthy participant contributes weight one to phi. A diseased
/// participant splits mass by stage posterior: stages at or past the
/// biomarker's rank make it abnormal (theta), earlier stages leave it
/// normal (phi).
fn soft_state_weights(
    input: &EbmInput,
    posteriors: &Mat<f64>,
    rank: usize,
) -> (Vec<f64>, Vec<f64>) {
    let n_participants = input.n_participants();
    let n_stages = input.n_stages();
    let mut theta = vec![0.0; n_participants];
    let mut phi = vec![0.0; n_participants];

    for row in 0..n_participants {
        if input.diseased[row] {
            let mut abnormal = 0.0;
            let mut normal = 0.0;
            for stage in 0..=n_stages {
                if stage >= rank {
                    abnormal += posteriors[(row, stage)];
                } else {
                    normal += posteriors[(row, stage)];
                }
            }
            theta[row] = abnormal;
            phi[row] = normal;
        } else {
            phi[row] = 1.0;
        }
    }
    (theta, phi)
}

fn biomarker_column(input: &EbmInput, index: usize) -> Vec<f64> {
    (0..input.n_participants())
        .map(|row| input.measurements[(row, index)])
        .collect()
}

fn previous_gaussian(density: &StateDensity) -> Option<(f64, f64)> {
    match density {
        StateDensity::Gaussian { mean, std_dev } => Some((*mean, *std_dev)),
        StateDensity::Kde(_) => None,
    }
}

/// Normal-Inverse-Gamma posterior-mean update.
///
/// The previous accepted parameters act as the prior location and scale;
/// `prior_mean_strength` is the pseudo-count on the mean and
/// `prior_variance_dof` the degrees of freedom on the variance:
///
/// ```text
/// mu'     = (k0 * mu0 + W * xbar) / (k0 + W)
/// sigma'^2 = (v0 * sigma0^2 + S + k0 * W / (k0 + W) * (xbar - mu0)^2)
///            / (v0 + W)
/// ```
///
/// with `W` the total soft weight, `xbar` the weighted mean, and `S` the
/// weighted sum of squared deviations.
pub struct ConjugatePriorsEstimator {
    pub prior_mean_strength: f64,
    pub prior_variance_dof: f64,
}

impl ConjugatePriorsEstimator {
    fn update_state(
        &self,
        values: &[f64],
        weights: &[f64],
        previous: &StateDensity,
    ) -> Option<StateDensity> {
        let (weighted_mean, weighted_variance) = weighted_mean_variance(values, weights)?;
        let (prior_mean, prior_std) = previous_gaussian(previous)?;

        let total_weight: f64 = weights.iter().sum();
        let k0 = self.prior_mean_strength;
        let v0 = self.prior_variance_dof;

        let posterior_mean =
            k0.mul_add(prior_mean, total_weight * weighted_mean) / (k0 + total_weight);
        let deviation = weighted_mean - prior_mean;
        let scatter = weighted_variance * total_weight;
        let posterior_variance = (v0.mul_add(prior_std * prior_std, scatter)
            + (k0 * total_weight / (k0 + total_weight)) * deviation * deviation)
            / (v0 + total_weight);

        Some(StateDensity::gaussian(
            posterior_mean,
            posterior_variance.sqrt(),
        ))
    }
}

impl ParameterEstimator for ConjugatePriorsEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate {
        let mut theta_phi = previous.clone();
        let mut fallbacks = 0usize;

        for index in 0..input.n_biomarkers() {
            let values = biomarker_column(input, index);
            let (theta_weights, phi_weights) =
                soft_state_weights(input, posteriors, order.stage_of(index));
            let prior = previous.biomarker(index);

            let theta = self.update_state(&values, &theta_weights, &prior.theta);
            let phi = self.update_state(&values, &phi_weights, &prior.phi);
            fallbacks += count_fallbacks(&theta, &phi);
            theta_phi.set_biomarker(
                index,
                BiomarkerParams {
                    theta: theta.unwrap_or_else(|| prior.theta.clone()),
                    phi: phi.unwrap_or_else(|| prior.phi.clone()),
                },
            );
        }

        ParameterUpdate {
            theta_phi,
            fallbacks,
        }
    }
}

/// Hard partition by each participant's most probable stage, then plain
/// sample mean/variance per partition.
pub struct HardKmeansEstimator;

fn hard_stages(input: &EbmInput, posteriors: &Mat<f64>) -> Vec<usize> {
    let n_stages = input.n_stages();
    (0..input.n_participants())
        .map(|row| {
            if input.diseased[row] {
                (0..=n_stages)
                    .max_by(|a, b| posteriors[(row, *a)].total_cmp(&posteriors[(row, *b)]))
                    .unwrap_or(0)
            } else {
                0
            }
        })
        .collect()
}

impl ParameterEstimator for HardKmeansEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate {
        let stages = hard_stages(input, posteriors);
        let mut theta_phi = previous.clone();
        let mut fallbacks = 0usize;

        for index in 0..input.n_biomarkers() {
            let rank = order.stage_of(index);
            let mut abnormal = Vec::new();
            let mut normal = Vec::new();
            for row in 0..input.n_participants() {
                let value = input.measurements[(row, index)];
                if input.diseased[row] && stages[row] >= rank {
                    abnormal.push(value);
                } else {
                    normal.push(value);
                }
            }

            let prior = previous.biomarker(index);
            let theta = sample_mean_variance(&abnormal)
                .map(|(mean, variance)| StateDensity::gaussian(mean, variance.sqrt()));
            let phi = sample_mean_variance(&normal)
                .map(|(mean, variance)| StateDensity::gaussian(mean, variance.sqrt()));
            fallbacks += count_fallbacks(&theta, &phi);
            theta_phi.set_biomarker(
                index,
                BiomarkerParams {
                    theta: theta.unwrap_or_else(|| prior.theta.clone()),
                    phi: phi.unwrap_or_else(|| prior.phi.clone()),
                },
            );
        }

        ParameterUpdate {
            theta_phi,
            fallbacks,
        }
    }
}

/// Single-pass posterior-weighted mean/variance fit.
pub struct MleEstimator;

impl ParameterEstimator for MleEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate {
        let mut theta_phi = previous.clone();
        let mut fallbacks = 0usize;

        for index in 0..input.n_biomarkers() {
            let values = biomarker_column(input, index);
            let (theta_weights, phi_weights) =
                soft_state_weights(input, posteriors, order.stage_of(index));

            let prior = previous.biomarker(index);
            let theta = weighted_mean_variance(&values, &theta_weights)
                .map(|(mean, variance)| StateDensity::gaussian(mean, variance.sqrt()));
            let phi = weighted_mean_variance(&values, &phi_weights)
                .map(|(mean, variance)| StateDensity::gaussian(mean, variance.sqrt()));
            fallbacks += count_fallbacks(&theta, &phi);
            theta_phi.set_biomarker(
                index,
                BiomarkerParams {
                    theta: theta.unwrap_or_else(|| prior.theta.clone()),
                    phi: phi.unwrap_or_else(|| prior.phi.clone()),
                },
            );
        }

        ParameterUpdate {
            theta_phi,
            fallbacks,
        }
    }
}

/// Iterates the weighted fit to local convergence: the stage-derived
/// weights seed a two-component Gaussian responsibility split that is
/// alternately refit and reassigned until the parameters settle. Healthy
/// participants stay clamped to the normal component throughout.
pub struct EmEstimator {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl EmEstimator {
    #[allow(clippy::similar_names)]
    fn fit_biomarker(
        &self,
        values: &[f64],
        diseased: &[bool],
        initial_theta_weights: &[f64],
        initial_phi_weights: &[f64],
    ) -> Option<(StateDensity, StateDensity)> {
        let mut theta_weights = initial_theta_weights.to_vec();
        let mut phi_weights = initial_phi_weights.to_vec();

        let (mut theta_mean, mut theta_var) = weighted_mean_variance(values, &theta_weights)?;
        let (mut phi_mean, mut phi_var) = weighted_mean_variance(values, &phi_weights)?;

        for _ in 0..self.max_iterations {
            let diseased_mass: f64 = diseased
                .iter()
                .zip(&theta_weights)
                .filter(|(flag, _)| **flag)
                .map(|(_, weight)| *weight)
                .sum();
            let diseased_count = usize_to_f64(diseased.iter().filter(|flag| **flag).count());
            let mixing = if diseased_count > 0.0 {
                (diseased_mass / diseased_count).clamp(WEIGHT_FLOOR, 1.0 - WEIGHT_FLOOR)
            } else {
                0.5
            };

            let theta_density = StateDensity::gaussian(theta_mean, theta_var.sqrt());
            let phi_density = StateDensity::gaussian(phi_mean, phi_var.sqrt());
            for (row, value) in values.iter().enumerate() {
                if !diseased[row] {
                    theta_weights[row] = 0.0;
                    phi_weights[row] = 1.0;
                    continue;
                }
                let log_abnormal = mixing.ln() + theta_density.log_density(*value);
                let log_normal = (1.0 - mixing).ln() + phi_density.log_density(*value);
                let responsibility = if log_abnormal >= log_normal {
                    1.0 / (1.0 + (log_normal - log_abnormal).exp())
                } else {
                    let ratio = (log_abnormal - log_normal).exp();
                    ratio / (1.0 + ratio)
                };
                theta_weights[row] = responsibility;
                phi_weights[row] = 1.0 - responsibility;
            }

            let (next_theta_mean, next_theta_var) = weighted_mean_variance(values, &theta_weights)?;
            let (next_phi_mean, next_phi_var) = weighted_mean_variance(values, &phi_weights)?;

            let shift = (next_theta_mean - theta_mean)
                .abs()
                .max((next_phi_mean - phi_mean).abs())
                .max((next_theta_var.sqrt() - theta_var.sqrt()).abs())
                .max((next_phi_var.sqrt() - phi_var.sqrt()).abs());

            theta_mean = next_theta_mean;
            theta_var = next_theta_var;
            phi_mean = next_phi_mean;
            phi_var = next_phi_var;

            if shift < self.tolerance {
                break;
            }
        }

        Some((
            StateDensity::gaussian(theta_mean, theta_var.sqrt()),
            StateDensity::gaussian(phi_mean, phi_var.sqrt()),
        ))
    }
}

impl ParameterEstimator for EmEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate {
        let mut theta_phi = previous.clone();
        let mut fallbacks = 0usize;

        for index in 0..input.n_biomarkers() {
            let values = biomarker_column(input, index);
            let (theta_weights, phi_weights) =
                soft_state_weights(input, posteriors, order.stage_of(index));

            match self.fit_biomarker(&values, &input.diseased, &theta_weights, &phi_weights) {
                Some((theta, phi)) => {
                    theta_phi.set_biomarker(index, BiomarkerParams { theta, phi });
                }
                None => {
                    // Both states keep their previous values: a collapsed
                    // responsibility split invalidates the whole refit.
                    fallbacks += 2;
                    debug!(
                        "EM refit degenerate for biomarker {index}; keeping previous parameters"
                    );
                }
            }
        }

        ParameterUpdate {
            theta_phi,
            fallbacks,
        }
    }
}

/// Weighted kernel density re-estimation.
pub struct KdeEstimator {
    pub weight_change_threshold: f64,
}

impl KdeEstimator {
    fn update_state(
        &self,
        values: &[f64],
        weights: &[f64],
        previous: &StateDensity,
    ) -> Option<StateDensity> {
        let support = weights.iter().filter(|w| **w > WEIGHT_FLOOR).count();
        if support < 2 {
            return None;
        }

        let total: f64 = weights.iter().sum();
        let normalized: Vec<f64> = weights.iter().map(|weight| weight / total).collect();

        // Barely moved weights keep the previous estimate so the chain
        // does not pay for a refit that changes nothing.
        if let StateDensity::Kde(kde) = previous
            && kde.weight_shift(&normalized) < self.weight_change_threshold
        {
            return Some(previous.clone());
        }

        Some(StateDensity::Kde(WeightedKde::new(
            values.to_vec(),
            Some(normalized),
        )))
    }
}

impl ParameterEstimator for KdeEstimator {
    fn estimate(
        &self,
        input: &EbmInput,
        order: &BiomarkerOrder,
        posteriors: &Mat<f64>,
        previous: &ThetaPhi,
    ) -> ParameterUpdate {
        let mut theta_phi = previous.clone();
        let mut fallbacks = 0usize;

        for index in 0..input.n_biomarkers() {
            let values = biomarker_column(input, index);
            let (theta_weights, phi_weights) =
                soft_state_weights(input, posteriors, order.stage_of(index));

            let prior = previous.biomarker(index);
            let theta = self.update_state(&values, &theta_weights, &prior.theta);
            let phi = self.update_state(&values, &phi_weights, &prior.phi);
            fallbacks += count_fallbacks(&theta, &phi);
            theta_phi.set_biomarker(
                index,
                BiomarkerParams {
                    theta: theta.unwrap_or_else(|| prior.theta.clone()),
                    phi: phi.unwrap_or_else(|| prior.phi.clone()),
                },
            );
        }

        ParameterUpdate {
            theta_phi,
            fallbacks,
        }
    }
}

fn count_fallbacks(theta: &Option<StateDensity>, phi: &Option<StateDensity>) -> usize {
    usize::from(theta.is_none()) + usize::from(phi.is_none())
}
