//! Stage prior and conjugate-prior configuration.

use crate::input::EbmInput;
use crate::utils::usize_to_f64;

use super::types::EbmError;

/// Prior over the S+1 candidate stages, shared across participants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StagePriorConfig {
    /// Every stage equally likely.
    Uniform,
    /// Posterior-predictive categorical of a symmetric Dirichlet with
    /// the given concentration, updated with label-derived pseudo-counts:
    /// the healthy participant count sits at stage 0 and the diseased
    /// count is spread evenly over stages 1..=S. Stages are therefore
    /// not a priori equally likely when the cohort is unbalanced.
    DirichletMultinomial { concentration: f64 },
}

impl Default for StagePriorConfig {
    fn default() -> Self {
        Self::DirichletMultinomial { concentration: 1.0 }
    }
}

impl StagePriorConfig {
    /// Whether the prior hyperparameters are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        match self {
            Self::Uniform => true,
            Self::DirichletMultinomial { concentration } => {
                concentration > 0.0 && concentration.is_finite()
            }
        }
    }
}

/// Hyperparameters for the EBM prior set.
#[derive(Debug, Clone, Copy)]
pub struct EbmPriorConfig {
    /// Stage prior used when marginalizing over latent stages.
    pub stage_prior: StagePriorConfig,
    /// Pseudo-count strength of the previous mean in the conjugate
    /// update.
    pub prior_mean_strength: f64,
    /// Degrees of freedom of the previous variance in the conjugate
    /// update.
    pub prior_variance_dof: f64,
}

impl Default for EbmPriorConfig {
    fn default() -> Self {
        Self {
            stage_prior: StagePriorConfig::default(),
            prior_mean_strength: 1.0,
            prior_variance_dof: 1.0,
        }
    }
}

impl EbmPriorConfig {
    /// Whether all prior hyperparameters are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.stage_prior.is_valid()
            && self.prior_mean_strength > 0.0
            && self.prior_mean_strength.is_finite()
            && self.prior_variance_dof > 0.0
            && self.prior_variance_dof.is_finite()
    }
}

/// Resolve the configured stage prior into a log-probability vector of
/// length S+1 for the given input.
///
/// # Errors
///
/// Returns `EbmError::InvalidPriorConfig` for unusable hyperparameters.
pub fn resolve_stage_prior(
    config: StagePriorConfig,
    input: &EbmInput,
) -> Result<Vec<f64>, EbmError> {
    if !config.is_valid() {
        return Err(EbmError::InvalidPriorConfig);
    }
    let n_stages = input.n_stages();
    let len = n_stages + 1;

    let log_probabilities = match config {
        StagePriorConfig::Uniform => vec![-usize_to_f64(len).ln(); len],
        StagePriorConfig::DirichletMultinomial { concentration } => {
            let healthy = usize_to_f64(input.n_healthy());
            let diseased_per_stage = if n_stages == 0 {
                0.0
            } else {
                usize_to_f64(input.n_diseased()) / usize_to_f64(n_stages)
            };
            let mut mass: Vec<f64> = Vec::with_capacity(len);
            mass.push(concentration + healthy);
            for _ in 0..n_stages {
                mass.push(concentration + diseased_per_stage);
            }
            let total: f64 = mass.iter().sum();
            mass.into_iter()
                .map(|value| (value / total).ln())
                .collect()
        }
    };

    Ok(log_probabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use faer::Mat;

    fn tiny_input(n_healthy: usize, n_diseased: usize) -> EbmInput {
        let n = n_healthy + n_diseased;
        let mut diseased = vec![false; n_healthy];
        diseased.extend(std::iter::repeat_n(true, n_diseased));
        EbmInput::new(
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            (0..n as u64).collect(),
            Mat::from_fn(n, 3, |_, _| 0.0),
            diseased,
        )
    }

    #[test]
    fn prior_defaults_are_valid() {
        assert!(EbmPriorConfig::default().is_valid());
    }

    #[test]
    fn uniform_prior_normalizes() {
        let input = tiny_input(2, 2);
        let log_prior = resolve_stage_prior(StagePriorConfig::Uniform, &input).expect("valid");
        assert_eq!(log_prior.len(), 4);
        let total: f64 = log_prior.iter().map(|lp| lp.exp()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1.0e-12);
        assert_relative_eq!(log_prior[0], log_prior[3]);
    }

    #[test]
    fn dirichlet_multinomial_weights_stage_zero_by_healthy_count() {
        let input = tiny_input(9, 3);
        let log_prior = resolve_stage_prior(
            StagePriorConfig::DirichletMultinomial { concentration: 1.0 },
            &input,
        )
        .expect("valid");
        assert!(log_prior[0] > log_prior[1]);
        assert_relative_eq!(log_prior[1], log_prior[3]);
        let total: f64 = log_prior.iter().map(|lp| lp.exp()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn invalid_concentration_is_rejected() {
        let input = tiny_input(1, 1);
        let err = resolve_stage_prior(
            StagePriorConfig::DirichletMultinomial { concentration: 0.0 },
            &input,
        )
        .expect_err("zero concentration");
        assert!(matches!(err, EbmError::InvalidPriorConfig));
    }
}
