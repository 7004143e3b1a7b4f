//! Core public types for the event-based model.

use std::collections::BTreeMap;
use std::str::FromStr;

use faer::Mat;
use thiserror::Error;

use super::params::ThetaPhi;
use crate::input::InputError;

/// Errors returned by EBM configuration, validation, and fitting.
#[derive(Debug, Error)]
pub enum EbmError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("burn-in ({burn_in}) must be smaller than iterations ({iterations})")]
    InvalidBurnIn { burn_in: usize, iterations: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error(
        "shuffle width ({n_shuffle}) must be at least 2 and at most the number of biomarkers ({n_biomarkers})"
    )]
    InvalidShuffle {
        n_shuffle: usize,
        n_biomarkers: usize,
    },
    #[error("order must assign each stage 1..={n_biomarkers} exactly once")]
    InvalidOrder { n_biomarkers: usize },
    #[error("unknown algorithm {name:?}")]
    UnknownAlgorithm { name: String },
    #[error("invalid stage prior or conjugate prior configuration")]
    InvalidPriorConfig,
    #[error("invalid estimator tuning configuration")]
    InvalidEstimatorTuning,
    #[error("trace contains no retained entries")]
    EmptyTrace,
    #[error("ground truth must assign a stage to exactly the fitted biomarkers")]
    GroundTruthMismatch,
}

/// Parameter-update strategy run inside the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Normal-Inverse-Gamma posterior-mean update against the previous
    /// accepted parameters.
    #[default]
    ConjugatePriors,
    /// Hard argmax-stage partition with sample mean/variance.
    HardKmeans,
    /// Single-pass posterior-weighted mean/variance.
    Mle,
    /// Posterior-weighted fit iterated to local convergence.
    Em,
    /// Weighted kernel density re-estimation.
    Kde,
}

impl Algorithm {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConjugatePriors => "conjugate_priors",
            Self::HardKmeans => "hard_kmeans",
            Self::Mle => "mle",
            Self::Em => "em",
            Self::Kde => "kde",
        }
    }

    /// All selectable variants, in documentation order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::ConjugatePriors,
            Self::HardKmeans,
            Self::Mle,
            Self::Em,
            Self::Kde,
        ]
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = EbmError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "conjugate_priors" => Ok(Self::ConjugatePriors),
            "hard_kmeans" => Ok(Self::HardKmeans),
            "mle" => Ok(Self::Mle),
            "em" => Ok(Self::Em),
            "kde" => Ok(Self::Kde),
            _ => Err(EbmError::UnknownAlgorithm {
                name: name.to_owned(),
            }),
        }
    }
}

/// Sampler schedule and algorithm selection.
#[derive(Debug, Clone, Copy)]
pub struct EbmFitOptions {
    /// Total MCMC iterations.
    pub iterations: usize,
    /// Number of order positions perturbed per proposal.
    pub n_shuffle: usize,
    /// Trace entries discarded before summarization.
    pub burn_in: usize,
    /// Keep every `thinning`-th entry after burn-in.
    pub thinning: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Parameter-update strategy.
    pub algorithm: Algorithm,
}

impl Default for EbmFitOptions {
    fn default() -> Self {
        Self {
            iterations: 2_000,
            n_shuffle: 2,
            burn_in: 1_000,
            thinning: 50,
            seed: 42,
            algorithm: Algorithm::ConjugatePriors,
        }
    }
}

impl EbmFitOptions {
    /// # Errors
    ///
    /// Returns `EbmError` if the schedule is internally inconsistent.
    /// The upper bound on `n_shuffle` is checked at fit time, once the
    /// number of biomarkers is known.
    pub const fn validate(self) -> Result<(), EbmError> {
        if self.iterations == 0 {
            return Err(EbmError::InvalidIterations);
        }
        if self.burn_in >= self.iterations {
            return Err(EbmError::InvalidBurnIn {
                burn_in: self.burn_in,
                iterations: self.iterations,
            });
        }
        if self.thinning == 0 {
            return Err(EbmError::InvalidThinning);
        }
        if self.n_shuffle < 2 {
            return Err(EbmError::InvalidShuffle {
                n_shuffle: self.n_shuffle,
                n_biomarkers: 0,
            });
        }
        Ok(())
    }

    /// Number of retained trace entries implied by the schedule.
    #[must_use]
    pub const fn retained_entries(self) -> usize {
        (self.iterations - self.burn_in).div_ceil(self.thinning)
    }
}

/// Tuning knobs for the iterative estimator variants.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorTuning {
    /// Maximum inner refinement rounds for the EM variant.
    pub em_max_iterations: usize,
    /// Parameter-change tolerance ending EM refinement early.
    pub em_tolerance: f64,
    /// Reuse the previous KDE when weights moved less than this on
    /// average.
    pub kde_weight_change_threshold: f64,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        Self {
            em_max_iterations: 25,
            em_tolerance: 1.0e-4,
            kde_weight_change_threshold: 0.01,
        }
    }
}

impl EstimatorTuning {
    /// Whether tuning values are numerically usable.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.em_max_iterations > 0
            && self.em_tolerance > 0.0
            && self.em_tolerance.is_finite()
            && self.kde_weight_change_threshold >= 0.0
            && self.kde_weight_change_threshold.is_finite()
    }
}

/// Full sampler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EbmSamplerConfig {
    pub fit_options: EbmFitOptions,
    pub prior_config: super::priors::EbmPriorConfig,
    pub estimator_tuning: EstimatorTuning,
}

impl EbmSamplerConfig {
    /// # Errors
    ///
    /// Returns `EbmError` if any configuration block is invalid.
    pub fn validate(self) -> Result<(), EbmError> {
        self.fit_options.validate()?;
        if !self.prior_config.is_valid() {
            return Err(EbmError::InvalidPriorConfig);
        }
        if !self.estimator_tuning.is_valid() {
            return Err(EbmError::InvalidEstimatorTuning);
        }
        Ok(())
    }
}

/// Fitted model metadata.
#[derive(Debug, Clone)]
pub struct EbmModel {
    pub n_biomarkers: usize,
    pub n_participants: usize,
    pub n_stages: usize,
    pub algorithm: Algorithm,
}

/// Proposal/acceptance counters for the order walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl AcceptanceStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    #[must_use]
    pub fn rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            crate::utils::usize_to_f64(self.accepted) / crate::utils::usize_to_f64(self.proposed)
        }
    }
}

/// Sampler diagnostics summary, including counters for the locally
/// recovered conditions (degenerate clusters, floored likelihoods).
#[derive(Debug, Clone, Copy, Default)]
pub struct EbmSamplerDiagnostics {
    pub iterations_completed: usize,
    pub retained_entries: usize,
    pub acceptance: AcceptanceStats,
    pub numerical_warnings: usize,
    pub degenerate_fallbacks: usize,
}

/// Output report from an EBM fit.
#[derive(Debug, Clone)]
pub struct EbmReport {
    pub diagnostics: EbmSamplerDiagnostics,
    /// Biomarker names in input column order, indexing the frequency and
    /// posterior matrices.
    pub biomarkers: Vec<String>,
    /// Per-biomarker stage with the highest retained-sample frequency,
    /// resolved greedily into a valid ordering.
    pub most_likely_order: BTreeMap<String, usize>,
    /// Order attached to the single highest log-likelihood anywhere in
    /// the trace.
    pub max_likelihood_order: BTreeMap<String, usize>,
    pub max_log_likelihood: f64,
    /// Biomarker x stage empirical frequency over retained entries.
    pub stage_frequencies: Mat<f64>,
    /// Participant x stage posterior under the final accepted state.
    pub stage_posteriors: Mat<f64>,
    /// Final accepted distribution parameters.
    pub final_theta_phi: ThetaPhi,
}

impl EbmReport {
    /// Retained-sample frequency of `biomarker` sitting at `stage`.
    #[must_use]
    pub fn stage_frequency_of(&self, biomarker: &str, stage: usize) -> Option<f64> {
        let row = self.biomarkers.iter().position(|name| name == biomarker)?;
        if stage == 0 || stage > self.stage_frequencies.ncols() {
            return None;
        }
        Some(self.stage_frequencies[(row, stage - 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_options_validate_and_retained_entries() {
        let options = EbmFitOptions {
            iterations: 100,
            burn_in: 20,
            thinning: 10,
            ..EbmFitOptions::default()
        };
        assert!(options.validate().is_ok());
        assert_eq!(options.retained_entries(), 8);
    }

    #[test]
    fn fit_options_reject_burn_in_at_or_beyond_iterations() {
        let options = EbmFitOptions {
            iterations: 50,
            burn_in: 50,
            ..EbmFitOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(EbmError::InvalidBurnIn {
                burn_in: 50,
                iterations: 50
            })
        ));
    }

    #[test]
    fn fit_options_reject_narrow_shuffle() {
        let options = EbmFitOptions {
            n_shuffle: 1,
            ..EbmFitOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(EbmError::InvalidShuffle { n_shuffle: 1, .. })
        ));
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in Algorithm::all() {
            let parsed: Algorithm = algorithm.name().parse().expect("known name");
            assert_eq!(parsed, algorithm);
        }
        assert!(matches!(
            "gibbs".parse::<Algorithm>(),
            Err(EbmError::UnknownAlgorithm { .. })
        ));
    }

    #[test]
    fn acceptance_stats_rate() {
        let mut stats = AcceptanceStats::default();
        stats.record(true);
        stats.record(false);
        stats.record(true);
        assert_eq!(stats.proposed, 3);
        assert_eq!(stats.accepted, 2);
        assert!((stats.rate() - 2.0 / 3.0).abs() < 1.0e-12);
    }

    #[test]
    fn sampler_config_rejects_invalid_tuning() {
        let config = EbmSamplerConfig {
            estimator_tuning: EstimatorTuning {
                em_max_iterations: 0,
                ..EstimatorTuning::default()
            },
            ..EbmSamplerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EbmError::InvalidEstimatorTuning)
        ));
    }
}
