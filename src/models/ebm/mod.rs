//! Event-based model of biomarker ordering.
//!
//! Estimates the temporal order in which biomarkers become abnormal
//! from cross-sectional healthy/diseased measurements, by
//! Metropolis-Hastings sampling over orderings with pluggable
//! per-biomarker distribution-parameter updates.

pub mod diagnostics;
pub mod estimators;
pub mod kde;
pub mod likelihood;
pub mod order;
pub mod params;
pub mod posterior;
pub mod priors;
pub mod report;
pub mod sampler;
pub mod types;

pub use diagnostics::{
    SeriesSummary, TraceDiagnostics, autocorrelation, effective_sample_size, summarize_trace,
};
pub use estimators::{
    ConjugatePriorsEstimator, EmEstimator, HardKmeansEstimator, KdeEstimator, MleEstimator,
    ParameterEstimator, ParameterUpdate, build_estimator,
};
pub use kde::WeightedKde;
pub use likelihood::{StageEvaluation, evaluate_stage_likelihoods, log_sum_exp};
pub use order::BiomarkerOrder;
pub use params::{BiomarkerParams, StateDensity, ThetaPhi};
pub use posterior::{
    OrderingEvaluation, TauResult, kendall_tau, kendall_tau_named, max_likelihood_entry,
    most_likely_order, retained_entries, stage_frequencies,
};
pub use priors::{EbmPriorConfig, StagePriorConfig, resolve_stage_prior};
pub use report::{OrderTables, render_order_tables};
pub use sampler::{
    McmcTrace, TraceEntry, fit_ebm_input, fit_ebm_input_with_config, fit_ebm_input_with_trace,
    fit_ebm_input_with_trace_config,
};
pub use types::{
    AcceptanceStats, Algorithm, EbmError, EbmFitOptions, EbmModel, EbmReport, EbmSamplerConfig,
    EbmSamplerDiagnostics, EstimatorTuning,
};

use std::collections::BTreeMap;

/// Kendall's tau of both reported orderings against a known ground
/// truth.
///
/// # Errors
///
/// Returns `EbmError::GroundTruthMismatch` unless the ground truth ranks
/// exactly the fitted biomarkers.
pub fn evaluate_against_ground_truth(
    report: &EbmReport,
    truth: &BTreeMap<String, usize>,
) -> Result<OrderingEvaluation, EbmError> {
    Ok(OrderingEvaluation {
        most_likely: kendall_tau_named(&report.most_likely_order, truth)?,
        max_likelihood: kendall_tau_named(&report.max_likelihood_order, truth)?,
    })
}
