//! Metropolis-Hastings sampler over biomarker orderings.
//!
//! The driver owns the only mutable chain state (current order, current
//! theta/phi, current log-likelihood) and walks the same pipeline each
//! iteration: propose an order, compute stage posteriors under the
//! parameters carried over from the previous iteration, re-estimate
//! parameters from those posteriors, re-score the proposal under the
//! re-estimated parameters, then accept or reject. Acceptance replaces
//! order, parameters, and log-likelihood together; rejection leaves all
//! three untouched.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::input::EbmInput;
use crate::preprocess::seed_theta_phi;
use crate::utils::usize_to_f64;

use super::estimators::build_estimator;
use super::likelihood::evaluate_stage_likelihoods;
use super::order::BiomarkerOrder;
use super::params::ThetaPhi;
use super::posterior::{max_likelihood_entry, most_likely_order, retained_entries, stage_frequencies};
use super::priors::resolve_stage_prior;
use super::types::{
    AcceptanceStats, EbmError, EbmFitOptions, EbmModel, EbmReport, EbmSamplerConfig,
    EbmSamplerDiagnostics,
};

/// One recorded iteration: the current order and log-likelihood after
/// the accept/reject decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub order: BiomarkerOrder,
    pub log_likelihood: f64,
}

/// Append-only record of the chain, one entry per iteration.
///
/// `record` clones the order it is handed, so entries are snapshots:
/// later mutation of the chain state can never rewrite recorded history.
#[derive(Debug, Clone, Default)]
pub struct McmcTrace {
    entries: Vec<TraceEntry>,
}

impl McmcTrace {
    pub fn record(&mut self, order: &BiomarkerOrder, log_likelihood: f64) {
        self.entries.push(TraceEntry {
            order: order.clone(),
            log_likelihood,
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log-likelihood series in iteration order.
    #[must_use]
    pub fn log_likelihoods(&self) -> Vec<f64> {
        self.entries
            .iter()
            .map(|entry| entry.log_likelihood)
            .collect()
    }
}

struct ChainState {
    order: BiomarkerOrder,
    theta_phi: ThetaPhi,
    log_likelihood: f64,
}

fn should_accept(delta: f64, rng: &mut StdRng) -> bool {
    delta >= 0.0 || rng.random::<f64>().ln() < delta
}

/// Fit the event-based model with default prior and tuning settings.
///
/// # Errors
///
/// Returns `EbmError` if the input or options are invalid.
pub fn fit_ebm_input(
    input: &EbmInput,
    options: EbmFitOptions,
) -> Result<(EbmModel, EbmReport), EbmError> {
    let config = EbmSamplerConfig {
        fit_options: options,
        ..EbmSamplerConfig::default()
    };
    let (model, report, _) = fit_ebm_input_with_trace_config(input, config)?;
    Ok((model, report))
}

/// Fit the event-based model with explicit prior and tuning settings.
///
/// # Errors
///
/// Returns `EbmError` if the input or configuration is invalid.
pub fn fit_ebm_input_with_config(
    input: &EbmInput,
    config: EbmSamplerConfig,
) -> Result<(EbmModel, EbmReport), EbmError> {
    let (model, report, _) = fit_ebm_input_with_trace_config(input, config)?;
    Ok((model, report))
}

/// Fit and additionally return the full accepted-order trace for
/// downstream visualization or convergence checks.
///
/// # Errors
///
/// Returns `EbmError` if the input or options are invalid.
pub fn fit_ebm_input_with_trace(
    input: &EbmInput,
    options: EbmFitOptions,
) -> Result<(EbmModel, EbmReport, McmcTrace), EbmError> {
    let config = EbmSamplerConfig {
        fit_options: options,
        ..EbmSamplerConfig::default()
    };
    fit_ebm_input_with_trace_config(input, config)
}

/// Fit with explicit settings and return the full trace.
///
/// # Errors
///
/// Returns `EbmError` if the input or configuration is invalid.
pub fn fit_ebm_input_with_trace_config(
    input: &EbmInput,
    config: EbmSamplerConfig,
) -> Result<(EbmModel, EbmReport, McmcTrace), EbmError> {
    config.validate()?;
    input.validate()?;
    let options = config.fit_options;
    let n_biomarkers = input.n_biomarkers();
    if options.n_shuffle > n_biomarkers {
        return Err(EbmError::InvalidShuffle {
            n_shuffle: options.n_shuffle,
            n_biomarkers,
        });
    }

    let log_stage_prior = resolve_stage_prior(config.prior_config.stage_prior, input)?;
    let estimator = build_estimator(
        options.algorithm,
        config.prior_config,
        config.estimator_tuning,
    );

    // One seedable stream drives seeding, initialization, proposals, and
    // accept draws, so a fixed seed reproduces the trace bit for bit.
    let mut rng = StdRng::seed_from_u64(options.seed);
    let seeded_theta_phi = seed_theta_phi(input, options.algorithm, &mut rng)?;

    let mut state = ChainState {
        order: BiomarkerOrder::random(n_biomarkers, &mut rng),
        theta_phi: seeded_theta_phi,
        log_likelihood: f64::NEG_INFINITY,
    };

    let mut trace = McmcTrace::default();
    let mut acceptance = AcceptanceStats::default();
    let mut numerical_warnings = 0usize;
    let mut degenerate_fallbacks = 0usize;
    let progress_interval = options.iterations.div_ceil(10).max(10);

    for iteration in 0..options.iterations {
        let candidate_order = state.order.propose(options.n_shuffle, &mut rng);

        // Posteriors under the carried-forward parameters, never a
        // re-seeded default.
        let scouting =
            evaluate_stage_likelihoods(input, &candidate_order, &state.theta_phi, &log_stage_prior);
        let update = estimator.estimate(
            input,
            &candidate_order,
            &scouting.posteriors,
            &state.theta_phi,
        );
        // Score with the same parameters that would be adopted.
        let rescored = evaluate_stage_likelihoods(
            input,
            &candidate_order,
            &update.theta_phi,
            &log_stage_prior,
        );

        numerical_warnings += scouting.numerical_warnings + rescored.numerical_warnings;
        degenerate_fallbacks += update.fallbacks;
        if rescored.numerical_warnings > 0 {
            warn!(
                "iteration {iteration}: floored {} non-finite participant marginal(s)",
                rescored.numerical_warnings
            );
        }

        let delta = rescored.total_log_likelihood - state.log_likelihood;
        let accepted = should_accept(delta, &mut rng);
        if accepted {
            state = ChainState {
                order: candidate_order,
                theta_phi: update.theta_phi,
                log_likelihood: rescored.total_log_likelihood,
            };
        }
        acceptance.record(accepted);
        trace.record(&state.order, state.log_likelihood);

        if (iteration + 1).is_multiple_of(progress_interval) {
            info!(
                "iteration {}/{}, acceptance ratio {:.2}%, log-likelihood {:.4}",
                iteration + 1,
                options.iterations,
                100.0 * usize_to_f64(acceptance.accepted) / usize_to_f64(iteration + 1),
                state.log_likelihood
            );
        }
    }

    // Final posteriors consistent with the final accepted state.
    let final_evaluation =
        evaluate_stage_likelihoods(input, &state.order, &state.theta_phi, &log_stage_prior);

    let retained = retained_entries(&trace, options.burn_in, options.thinning);
    let retained_count = retained.len();
    let frequencies = stage_frequencies(&retained, n_biomarkers);

    let most_likely = most_likely_order(&trace, options.burn_in, options.thinning)?;
    let best_entry = max_likelihood_entry(&trace).ok_or(EbmError::EmptyTrace)?;

    let model = EbmModel {
        n_biomarkers,
        n_participants: input.n_participants(),
        n_stages: input.n_stages(),
        algorithm: options.algorithm,
    };
    let report = EbmReport {
        diagnostics: EbmSamplerDiagnostics {
            iterations_completed: options.iterations,
            retained_entries: retained_count,
            acceptance,
            numerical_warnings,
            degenerate_fallbacks,
        },
        biomarkers: input.biomarkers.clone(),
        most_likely_order: most_likely.named(&input.biomarkers),
        max_likelihood_order: best_entry.order.named(&input.biomarkers),
        max_log_likelihood: best_entry.log_likelihood,
        stage_frequencies: frequencies,
        stage_posteriors: final_evaluation.posteriors,
        final_theta_phi: state.theta_phi,
    };

    Ok((model, report, trace))
}
