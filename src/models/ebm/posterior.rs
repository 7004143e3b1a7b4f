//! Posterior summarization of the accepted-order trace: burn-in and
//! thinning, stage-frequency summaries, the two reported orderings, and
//! Kendall's tau evaluation against a known ground truth.

use std::collections::BTreeMap;

use faer::Mat;
use statrs::function::erf::erf;

use crate::utils::usize_to_f64;

use super::order::BiomarkerOrder;
use super::sampler::{McmcTrace, TraceEntry};
use super::types::EbmError;

/// Retained trace entries after discarding `burn_in` and keeping every
/// `thinning`-th entry.
#[must_use]
pub fn retained_entries(trace: &McmcTrace, burn_in: usize, thinning: usize) -> Vec<&TraceEntry> {
    if burn_in >= trace.len() || thinning == 0 {
        return Vec::new();
    }
    trace.entries()[burn_in..].iter().step_by(thinning).collect()
}

/// Biomarker x stage empirical frequency matrix over the retained
/// entries. Row `i`, column `s` is the share of retained samples placing
/// biomarker `i` at stage `s + 1`.
#[must_use]
pub fn stage_frequencies(retained: &[&TraceEntry], n_biomarkers: usize) -> Mat<f64> {
    let mut counts = Mat::<f64>::zeros(n_biomarkers, n_biomarkers);
    for entry in retained {
        for (index, stage) in entry.order.stages().iter().enumerate() {
            counts[(index, stage - 1)] += 1.0;
        }
    }
    if !retained.is_empty() {
        let total = usize_to_f64(retained.len());
        for row in 0..n_biomarkers {
            for col in 0..n_biomarkers {
                counts[(row, col)] /= total;
            }
        }
    }
    counts
}

/// Most likely ordering across retained samples.
///
/// Repeatedly assigns the globally highest-frequency unassigned
/// (biomarker, stage) pair and discards pairs conflicting with earlier
/// assignments, producing a valid bijection even when per-biomarker
/// argmax stages collide.
///
/// # Errors
///
/// Returns `EbmError::EmptyTrace` when no entries survive burn-in and
/// thinning.
pub fn most_likely_order(
    trace: &McmcTrace,
    burn_in: usize,
    thinning: usize,
) -> Result<BiomarkerOrder, EbmError> {
    let retained = retained_entries(trace, burn_in, thinning);
    if retained.is_empty() {
        return Err(EbmError::EmptyTrace);
    }
    let n_biomarkers = retained[0].order.len();
    let frequencies = stage_frequencies(&retained, n_biomarkers);

    let mut pairs: Vec<(usize, usize, f64)> = Vec::with_capacity(n_biomarkers * n_biomarkers);
    for index in 0..n_biomarkers {
        for stage in 1..=n_biomarkers {
            pairs.push((index, stage, frequencies[(index, stage - 1)]));
        }
    }
    // Highest frequency first; ties broken deterministically by index
    // and stage.
    pairs.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut stages = vec![0usize; n_biomarkers];
    let mut stage_taken = vec![false; n_biomarkers];
    let mut assigned = 0usize;
    for (index, stage, _) in pairs {
        if stages[index] != 0 || stage_taken[stage - 1] {
            continue;
        }
        stages[index] = stage;
        stage_taken[stage - 1] = true;
        assigned += 1;
        if assigned == n_biomarkers {
            break;
        }
    }

    BiomarkerOrder::from_stages(stages)
}

/// Entry holding the single highest log-likelihood anywhere in the
/// trace (not restricted to retained samples).
#[must_use]
pub fn max_likelihood_entry(trace: &McmcTrace) -> Option<&TraceEntry> {
    trace
        .entries()
        .iter()
        .max_by(|a, b| a.log_likelihood.total_cmp(&b.log_likelihood))
}

/// Kendall rank correlation with a two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TauResult {
    pub tau: f64,
    pub p_value: f64,
}

/// Kendall's tau-b between two equally long rankings, with a two-sided
/// normal-approximation p-value.
#[must_use]
pub fn kendall_tau(a: &[usize], b: &[usize]) -> TauResult {
    let n = a.len().min(b.len());
    if n < 2 {
        return TauResult {
            tau: f64::NAN,
            p_value: f64::NAN,
        };
    }

    let mut concordant_minus_discordant = 0i64;
    let mut ties_a = 0i64;
    let mut ties_b = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let da = a[i].cmp(&a[j]);
            let db = b[i].cmp(&b[j]);
            if da == std::cmp::Ordering::Equal {
                ties_a += 1;
                continue;
            }
            if db == std::cmp::Ordering::Equal {
                ties_b += 1;
                continue;
            }
            if da == db {
                concordant_minus_discordant += 1;
            } else {
                concordant_minus_discordant -= 1;
            }
        }
    }

    let n_f = usize_to_f64(n);
    let total_pairs = n_f * (n_f - 1.0) / 2.0;
    #[allow(clippy::cast_precision_loss)]
    let numerator = concordant_minus_discordant as f64;
    #[allow(clippy::cast_precision_loss)]
    let denominator =
        ((total_pairs - ties_a as f64) * (total_pairs - ties_b as f64)).sqrt();
    let tau = if denominator > 0.0 {
        numerator / denominator
    } else {
        f64::NAN
    };

    // Normal approximation to the null distribution of C - D.
    let variance = n_f * (n_f - 1.0) * (2.0 * n_f + 5.0) / 18.0;
    let z = numerator / variance.sqrt();
    let p_value = 2.0 * standard_normal_sf(z.abs());

    TauResult {
        tau,
        p_value: p_value.min(1.0),
    }
}

fn standard_normal_sf(value: f64) -> f64 {
    0.5 * (1.0 - erf(value / std::f64::consts::SQRT_2))
}

/// Kendall's tau of the two reported orderings against a ground truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingEvaluation {
    pub most_likely: TauResult,
    pub max_likelihood: TauResult,
}

/// Compare two name-keyed orderings.
///
/// # Errors
///
/// Returns `EbmError::GroundTruthMismatch` unless both maps rank exactly
/// the same biomarkers.
pub fn kendall_tau_named(
    estimate: &BTreeMap<String, usize>,
    truth: &BTreeMap<String, usize>,
) -> Result<TauResult, EbmError> {
    if estimate.len() != truth.len() {
        return Err(EbmError::GroundTruthMismatch);
    }
    let mut estimated_stages = Vec::with_capacity(estimate.len());
    let mut true_stages = Vec::with_capacity(estimate.len());
    for (biomarker, stage) in estimate {
        let Some(true_stage) = truth.get(biomarker) else {
            return Err(EbmError::GroundTruthMismatch);
        };
        estimated_stages.push(*stage);
        true_stages.push(*true_stage);
    }
    Ok(kendall_tau(&estimated_stages, &true_stages))
}
