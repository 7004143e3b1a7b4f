#![forbid(unsafe_code)]

//! # `event_based_models`
//!
//! Event-based models (EBM) for disease progression: given
//! cross-sectional biomarker measurements labeled healthy or diseased,
//! estimate the most likely order in which the biomarkers become
//! abnormal, jointly with the normal/abnormal distribution parameters of
//! each biomarker, by Metropolis-Hastings sampling over orderings.
//!
//! The latent disease stage of each participant is never observed; the
//! likelihood marginalizes over it in log space. Five interchangeable
//! parameter-update strategies share one sampler skeleton: conjugate
//! priors, hard k-means, maximum-likelihood soft assignment,
//! expectation-maximization, and kernel density estimation.

pub mod input;
pub mod models;
pub mod preprocess;
pub mod utils;

pub use input::{EbmInput, InputError, MeasurementRecord};
pub use preprocess::{MeasurementDiagnostics, measurement_diagnostics, seed_theta_phi};

pub use models::ebm::{
    AcceptanceStats, Algorithm, BiomarkerOrder, BiomarkerParams, EbmError, EbmFitOptions, EbmModel,
    EbmPriorConfig, EbmReport, EbmSamplerConfig, EbmSamplerDiagnostics, EstimatorTuning, McmcTrace,
    OrderTables, OrderingEvaluation, ParameterEstimator, ParameterUpdate, SeriesSummary,
    StageEvaluation, StagePriorConfig, StateDensity, TauResult, ThetaPhi, TraceDiagnostics,
    TraceEntry, WeightedKde,
    autocorrelation, build_estimator, effective_sample_size, evaluate_against_ground_truth,
    evaluate_stage_likelihoods, fit_ebm_input, fit_ebm_input_with_config, fit_ebm_input_with_trace,
    fit_ebm_input_with_trace_config, kendall_tau, kendall_tau_named, log_sum_exp,
    max_likelihood_entry, most_likely_order, render_order_tables, resolve_stage_prior,
    retained_entries, stage_frequencies, summarize_trace,
};
