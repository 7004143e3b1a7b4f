//! Input diagnostics and seeded parameter initialization.
//!
//! Before the first MCMC iteration every biomarker needs a starting
//! theta/phi pair. A seeded two-cluster pass over each biomarker's
//! measurements provides it: the cluster holding the majority of the
//! healthy measurements becomes the normal state, the other becomes the
//! abnormal state. The sampler never calls this again mid-chain.

use log::debug;
use rand::RngExt;
use rand::rngs::StdRng;

use crate::input::EbmInput;
use crate::models::ebm::kde::WeightedKde;
use crate::models::ebm::params::{BiomarkerParams, StateDensity, ThetaPhi};
use crate::models::ebm::types::{Algorithm, EbmError};
use crate::utils::{sample_mean_variance, usize_to_f64};

const MAX_LLOYD_ROUNDS: usize = 100;

/// Simple counts describing an input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementDiagnostics {
    pub n_participants: usize,
    pub n_biomarkers: usize,
    pub n_measurements: usize,
    pub n_diseased: usize,
    pub n_healthy: usize,
    pub n_non_finite: usize,
}

#[must_use]
pub fn measurement_diagnostics(input: &EbmInput) -> MeasurementDiagnostics {
    let n_participants = input.n_participants();
    let n_biomarkers = input.n_biomarkers();
    let mut n_non_finite = 0usize;
    for row in 0..n_participants {
        for col in 0..n_biomarkers {
            if !input.measurements[(row, col)].is_finite() {
                n_non_finite += 1;
            }
        }
    }
    MeasurementDiagnostics {
        n_participants,
        n_biomarkers,
        n_measurements: n_participants * n_biomarkers,
        n_diseased: input.n_diseased(),
        n_healthy: input.n_healthy(),
        n_non_finite,
    }
}

/// Seed initial theta/phi estimates via a per-biomarker two-cluster
/// pass driven by the shared RNG stream.
///
/// Parametric algorithms receive Gaussian seeds; [`Algorithm::Kde`]
/// receives per-state kernel density seeds built on the same clusters.
/// Degenerate clusters (fewer than two members, or a biomarker with no
/// spread) seed from the biomarker's overall statistics instead.
///
/// # Errors
///
/// Returns `EbmError` if the input fails validation.
pub fn seed_theta_phi(
    input: &EbmInput,
    algorithm: Algorithm,
    rng: &mut StdRng,
) -> Result<ThetaPhi, EbmError> {
    input.validate()?;

    let mut params = Vec::with_capacity(input.n_biomarkers());
    for index in 0..input.n_biomarkers() {
        let values: Vec<f64> = (0..input.n_participants())
            .map(|row| input.measurements[(row, index)])
            .collect();
        let split = two_means_split(&values, rng);
        params.push(seed_biomarker(&values, &input.diseased, split, algorithm));
    }
    Ok(ThetaPhi::new(params))
}

struct ClusterSplit {
    /// Cluster label (0/1) per measurement, or `None` when the biomarker
    /// has no usable spread.
    assignment: Option<Vec<usize>>,
}

fn two_means_split(values: &[f64], rng: &mut StdRng) -> ClusterSplit {
    let n = values.len();
    if n < 2 {
        return ClusterSplit { assignment: None };
    }

    let first = rng.random_range(0..n);
    let Some(second) = values
        .iter()
        .enumerate()
        .cycle()
        .skip(rng.random_range(0..n))
        .take(n)
        .find(|(_, value)| (**value - values[first]).abs() > 0.0)
        .map(|(index, _)| index)
    else {
        return ClusterSplit { assignment: None };
    };

    let mut centers = [values[first], values[second]];
    let mut assignment = vec![0usize; n];
    for _ in 0..MAX_LLOYD_ROUNDS {
        let mut changed = false;
        for (slot, value) in values.iter().enumerate() {
            let nearest = usize::from((value - centers[1]).abs() < (value - centers[0]).abs());
            if assignment[slot] != nearest {
                assignment[slot] = nearest;
                changed = true;
            }
        }

        for label in 0..2 {
            let members: Vec<f64> = values
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == label)
                .map(|(value, _)| *value)
                .collect();
            if !members.is_empty() {
                centers[label] = members.iter().sum::<f64>() / usize_to_f64(members.len());
            }
        }

        if !changed {
            break;
        }
    }

    ClusterSplit {
        assignment: Some(assignment),
    }
}

fn seed_biomarker(
    values: &[f64],
    diseased: &[bool],
    split: ClusterSplit,
    algorithm: Algorithm,
) -> BiomarkerParams {
    let Some(assignment) = split.assignment else {
        debug!("seeding from overall statistics: biomarker has no spread");
        let overall = overall_density(values, algorithm);
        return BiomarkerParams {
            theta: overall.clone(),
            phi: overall,
        };
    };

    let cluster: [Vec<f64>; 2] = [
        cluster_members(values, &assignment, 0),
        cluster_members(values, &assignment, 1),
    ];
    let healthy_votes = [
        healthy_members(diseased, &assignment, 0),
        healthy_members(diseased, &assignment, 1),
    ];

    // The normal state is the cluster healthy participants favor; with
    // no healthy measurements at all, the lower-mean cluster stands in.
    let phi_label = if healthy_votes[0] != healthy_votes[1] {
        usize::from(healthy_votes[1] > healthy_votes[0])
    } else {
        usize::from(cluster_mean(&cluster[1]) < cluster_mean(&cluster[0]))
    };
    let theta_label = 1 - phi_label;

    BiomarkerParams {
        theta: cluster_density(&cluster[theta_label], values, algorithm),
        phi: cluster_density(&cluster[phi_label], values, algorithm),
    }
}

fn cluster_members(values: &[f64], assignment: &[usize], label: usize) -> Vec<f64> {
    values
        .iter()
        .zip(assignment)
        .filter(|(_, a)| **a == label)
        .map(|(value, _)| *value)
        .collect()
}

fn healthy_members(diseased: &[bool], assignment: &[usize], label: usize) -> usize {
    diseased
        .iter()
        .zip(assignment)
        .filter(|(flag, a)| !**flag && **a == label)
        .count()
}

fn cluster_mean(members: &[f64]) -> f64 {
    if members.is_empty() {
        f64::INFINITY
    } else {
        members.iter().sum::<f64>() / usize_to_f64(members.len())
    }
}

fn cluster_density(members: &[f64], all_values: &[f64], algorithm: Algorithm) -> StateDensity {
    match sample_mean_variance(members) {
        Some((mean, variance)) if algorithm != Algorithm::Kde => {
            StateDensity::gaussian(mean, variance.sqrt())
        }
        Some(_) => StateDensity::Kde(WeightedKde::new(members.to_vec(), None)),
        None => overall_density(all_values, algorithm),
    }
}

fn overall_density(values: &[f64], algorithm: Algorithm) -> StateDensity {
    if algorithm == Algorithm::Kde {
        return StateDensity::Kde(WeightedKde::new(values.to_vec(), None));
    }
    let (mean, variance) = sample_mean_variance(values).unwrap_or((
        values.first().copied().unwrap_or(0.0),
        0.0,
    ));
    StateDensity::gaussian(mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use faer::Mat;
    use rand::SeedableRng;

    fn bimodal_input() -> EbmInput {
        let values = [0.1, -0.1, 0.0, 0.2, 9.9, 10.1, 10.0, 9.8];
        EbmInput::new(
            vec!["a".to_owned()],
            (0..8).collect(),
            Mat::from_fn(8, 1, |row, _| values[row]),
            vec![false, false, false, false, true, true, true, true],
        )
    }

    #[test]
    fn diagnostics_count_labels_and_cells() {
        let diagnostics = measurement_diagnostics(&bimodal_input());
        assert_eq!(diagnostics.n_participants, 8);
        assert_eq!(diagnostics.n_biomarkers, 1);
        assert_eq!(diagnostics.n_measurements, 8);
        assert_eq!(diagnostics.n_diseased, 4);
        assert_eq!(diagnostics.n_healthy, 4);
        assert_eq!(diagnostics.n_non_finite, 0);
    }

    #[test]
    fn seeding_separates_bimodal_measurements() {
        let input = bimodal_input();
        let mut rng = StdRng::seed_from_u64(17);
        let theta_phi =
            seed_theta_phi(&input, Algorithm::ConjugatePriors, &mut rng).expect("valid input");
        let params = theta_phi.biomarker(0);
        match (&params.theta, &params.phi) {
            (
                StateDensity::Gaussian { mean: theta, .. },
                StateDensity::Gaussian { mean: phi, .. },
            ) => {
                assert_relative_eq!(*theta, 9.95, epsilon = 0.01);
                assert_relative_eq!(*phi, 0.05, epsilon = 0.01);
            }
            _ => panic!("expected Gaussian seeds"),
        }
    }

    #[test]
    fn seeding_is_reproducible_for_a_fixed_seed() {
        let input = bimodal_input();
        let mut rng_a = StdRng::seed_from_u64(23);
        let mut rng_b = StdRng::seed_from_u64(23);
        let a = seed_theta_phi(&input, Algorithm::Mle, &mut rng_a).expect("valid");
        let b = seed_theta_phi(&input, Algorithm::Mle, &mut rng_b).expect("valid");
        assert_eq!(a, b);
    }

    #[test]
    fn kde_algorithm_receives_kde_seeds() {
        let input = bimodal_input();
        let mut rng = StdRng::seed_from_u64(29);
        let theta_phi = seed_theta_phi(&input, Algorithm::Kde, &mut rng).expect("valid");
        assert!(!theta_phi.biomarker(0).theta.is_gaussian());
        assert!(!theta_phi.biomarker(0).phi.is_gaussian());
    }

    #[test]
    fn constant_biomarker_seeds_from_overall_statistics() {
        let input = EbmInput::new(
            vec!["flat".to_owned()],
            (0..4).collect(),
            Mat::from_fn(4, 1, |_, _| 2.5),
            vec![false, false, true, true],
        );
        let mut rng = StdRng::seed_from_u64(31);
        let theta_phi =
            seed_theta_phi(&input, Algorithm::ConjugatePriors, &mut rng).expect("valid");
        let params = theta_phi.biomarker(0);
        assert_eq!(params.theta, params.phi);
        match params.phi {
            StateDensity::Gaussian { mean, .. } => assert_relative_eq!(mean, 2.5),
            StateDensity::Kde(_) => panic!("expected Gaussian"),
        }
    }

    #[test]
    fn all_healthy_input_still_seeds_both_states() {
        let values = [0.0, 0.1, 5.0, 5.1];
        let input = EbmInput::new(
            vec!["a".to_owned()],
            (0..4).collect(),
            Mat::from_fn(4, 1, |row, _| values[row]),
            vec![false; 4],
        );
        let mut rng = StdRng::seed_from_u64(37);
        let theta_phi = seed_theta_phi(&input, Algorithm::Mle, &mut rng).expect("valid");
        let params = theta_phi.biomarker(0);
        // Healthy votes tie-break by mean: the lower cluster is phi.
        match (&params.theta, &params.phi) {
            (
                StateDensity::Gaussian { mean: theta, .. },
                StateDensity::Gaussian { mean: phi, .. },
            ) => assert!(theta > phi),
            _ => panic!("expected Gaussian seeds"),
        }
    }
}
