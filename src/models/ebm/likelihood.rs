//! Stage-likelihood evaluation: marginalizes each participant's latent
//! disease stage under a candidate order and parameter store.
//!
//! All accumulation happens in log space; marginalization over stages
//! uses log-sum-exp so many-biomarker products never underflow.

use faer::Mat;

use crate::input::EbmInput;
use crate::utils::usize_to_f64;

use super::order::BiomarkerOrder;
use super::params::ThetaPhi;

/// Floor substituted for a non-finite participant marginal so the
/// accept/reject delta is always well-defined.
const LOG_MARGINAL_FLOOR: f64 = -1.0e12;

/// Posteriors and total log-likelihood for one (order, parameters) pair.
#[derive(Debug, Clone)]
pub struct StageEvaluation {
    /// Participant x stage posterior matrix, rows summing to one.
    /// Column `s` is the posterior probability of stage `s`.
    pub posteriors: Mat<f64>,
    /// Sum over participants of the log marginal likelihood.
    pub total_log_likelihood: f64,
    /// Number of participants whose marginal had to be floored.
    pub numerical_warnings: usize,
}

/// Numerically stable `ln(sum(exp(values)))`.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|value| (value - max).exp()).sum();
    max + sum.ln()
}

/// Evaluate stage posteriors and the data log-likelihood.
///
/// Healthy-labeled participants are pinned to stage 0: their posterior
/// row has all mass at column 0 and their marginal is the all-normal
/// log density, with no prior weighting. Diseased participants
/// marginalize over stages 0..=S with the supplied log stage prior.
#[must_use]
pub fn evaluate_stage_likelihoods(
    input: &EbmInput,
    order: &BiomarkerOrder,
    theta_phi: &ThetaPhi,
    log_stage_prior: &[f64],
) -> StageEvaluation {
    let n_participants = input.n_participants();
    let n_stages = input.n_stages();
    debug_assert_eq!(order.len(), n_stages);
    debug_assert_eq!(log_stage_prior.len(), n_stages + 1);

    let by_stage = order.biomarker_at_stage();
    let mut posteriors = Mat::<f64>::zeros(n_participants, n_stages + 1);
    let mut total_log_likelihood = 0.0;
    let mut numerical_warnings = 0usize;
    let mut stage_terms = vec![0.0; n_stages + 1];

    for row in 0..n_participants {
        let all_normal: f64 = (0..n_stages)
            .map(|col| theta_phi.phi_log_density(col, input.measurements[(row, col)]))
            .sum();

        if !input.diseased[row] {
            posteriors[(row, 0)] = 1.0;
            let mut marginal = all_normal;
            if !marginal.is_finite() {
                marginal = LOG_MARGINAL_FLOOR;
                numerical_warnings += 1;
            }
            total_log_likelihood += marginal;
            continue;
        }

        // Walking the stages in rank order swaps exactly one biomarker
        // from its normal to its abnormal density per step.
        let mut conditional = all_normal;
        stage_terms[0] = log_stage_prior[0] + conditional;
        for (stage, &biomarker) in by_stage.iter().enumerate() {
            let value = input.measurements[(row, biomarker)];
            conditional += theta_phi.theta_log_density(biomarker, value)
                - theta_phi.phi_log_density(biomarker, value);
            stage_terms[stage + 1] = log_stage_prior[stage + 1] + conditional;
        }

        let mut marginal = log_sum_exp(&stage_terms);
        if marginal.is_finite() {
            for (stage, term) in stage_terms.iter().enumerate() {
                posteriors[(row, stage)] = (term - marginal).exp();
            }
        } else {
            // Floor the marginal and spread the posterior uniformly so
            // one pathological participant cannot poison the chain.
            marginal = LOG_MARGINAL_FLOOR;
            numerical_warnings += 1;
            let uniform = 1.0 / usize_to_f64(n_stages + 1);
            for stage in 0..=n_stages {
                posteriors[(row, stage)] = uniform;
            }
        }
        total_log_likelihood += marginal;
    }

    StageEvaluation {
        posteriors,
        total_log_likelihood,
        numerical_warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ebm::params::{BiomarkerParams, StateDensity};
    use approx::assert_relative_eq;
    use faer::Mat;

    fn store(n: usize) -> ThetaPhi {
        ThetaPhi::new(
            (0..n)
                .map(|_| BiomarkerParams {
                    theta: StateDensity::gaussian(5.0, 1.0),
                    phi: StateDensity::gaussian(0.0, 1.0),
                })
                .collect(),
        )
    }

    fn uniform_log_prior(n_stages: usize) -> Vec<f64> {
        vec![-usize_to_f64(n_stages + 1).ln(); n_stages + 1]
    }

    #[test]
    fn log_sum_exp_matches_direct_sum() {
        let values: [f64; 3] = [-1.0, -2.0, -3.0];
        let direct: f64 = values.iter().map(|v| v.exp()).sum();
        assert_relative_eq!(log_sum_exp(&values), direct.ln(), epsilon = 1.0e-12);
    }

    #[test]
    fn log_sum_exp_survives_extreme_magnitudes() {
        let result = log_sum_exp(&[-1_000.0, -1_000.0]);
        assert_relative_eq!(result, -1_000.0 + 2.0_f64.ln(), epsilon = 1.0e-9);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn healthy_participants_are_pinned_to_stage_zero() {
        let input = EbmInput::new(
            vec!["a".to_owned(), "b".to_owned()],
            vec![1],
            Mat::from_fn(1, 2, |_, _| 0.0),
            vec![false],
        );
        let order = BiomarkerOrder::from_stages(vec![1, 2]).expect("valid");
        let evaluation =
            evaluate_stage_likelihoods(&input, &order, &store(2), &uniform_log_prior(2));
        assert_relative_eq!(evaluation.posteriors[(0, 0)], 1.0);
        assert_relative_eq!(evaluation.posteriors[(0, 1)], 0.0);
        assert_relative_eq!(evaluation.posteriors[(0, 2)], 0.0);
        // Marginal is the plain all-normal density: two standard normals
        // evaluated at their mean.
        assert_relative_eq!(
            evaluation.total_log_likelihood,
            -std::f64::consts::TAU.ln(),
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn posterior_rows_normalize_for_diseased_participants() {
        let input = EbmInput::new(
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            vec![1],
            Mat::from_fn(1, 3, |_, col| if col == 0 { 5.0 } else { 0.0 }),
            vec![true],
        );
        let order = BiomarkerOrder::from_stages(vec![1, 2, 3]).expect("valid");
        let evaluation =
            evaluate_stage_likelihoods(&input, &order, &store(3), &uniform_log_prior(3));
        let row_sum: f64 = (0..4).map(|stage| evaluation.posteriors[(0, stage)]).sum();
        assert_relative_eq!(row_sum, 1.0, epsilon = 1.0e-9);
        // Only the first-ranked biomarker looks abnormal, so stage 1
        // dominates.
        let best = (0..4)
            .max_by(|a, b| {
                evaluation.posteriors[(0, *a)].total_cmp(&evaluation.posteriors[(0, *b)])
            })
            .unwrap_or(0);
        assert_eq!(best, 1);
        assert_eq!(evaluation.numerical_warnings, 0);
    }

    #[test]
    fn stage_ordering_tracks_the_order_not_column_position() {
        // Reverse order: biomarker at column 2 becomes abnormal first.
        let input = EbmInput::new(
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            vec![1],
            Mat::from_fn(1, 3, |_, col| if col == 2 { 5.0 } else { 0.0 }),
            vec![true],
        );
        let order = BiomarkerOrder::from_stages(vec![3, 2, 1]).expect("valid");
        let evaluation =
            evaluate_stage_likelihoods(&input, &order, &store(3), &uniform_log_prior(3));
        let best = (0..4)
            .max_by(|a, b| {
                evaluation.posteriors[(0, *a)].total_cmp(&evaluation.posteriors[(0, *b)])
            })
            .unwrap_or(0);
        assert_eq!(best, 1);
    }
}
