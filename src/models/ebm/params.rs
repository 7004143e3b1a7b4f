//! Per-biomarker distribution parameter store.
//!
//! Each biomarker carries two state densities: theta for the abnormal
//! state and phi for the normal state. Parametric algorithms store
//! Gaussian mean/standard-deviation pairs; the non-parametric algorithm
//! stores weighted kernel density estimates.

use super::kde::WeightedKde;

/// Floor applied to Gaussian standard deviations so a degenerate
/// (zero-variance) state behaves as a sharply peaked density instead of
/// producing NaN log densities.
pub const MIN_STD_DEV: f64 = 1.0e-6;

/// Density of one biomarker state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDensity {
    Gaussian { mean: f64, std_dev: f64 },
    Kde(WeightedKde),
}

impl StateDensity {
    #[must_use]
    pub fn gaussian(mean: f64, std_dev: f64) -> Self {
        Self::Gaussian {
            mean,
            std_dev: std_dev.max(MIN_STD_DEV),
        }
    }

    /// Log density at `value`. Never NaN: Gaussian scales are floored at
    /// construction and KDE densities are floored before the logarithm.
    #[must_use]
    pub fn log_density(&self, value: f64) -> f64 {
        match self {
            Self::Gaussian { mean, std_dev } => {
                let sigma = std_dev.max(MIN_STD_DEV);
                let z = (value - mean) / sigma;
                -0.5 * z.mul_add(z, std::f64::consts::TAU.ln()) - sigma.ln()
            }
            Self::Kde(kde) => kde.log_density(value),
        }
    }

    #[must_use]
    pub const fn is_gaussian(&self) -> bool {
        matches!(self, Self::Gaussian { .. })
    }
}

/// Theta/phi pair for a single biomarker.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomarkerParams {
    pub theta: StateDensity,
    pub phi: StateDensity,
}

/// Distribution parameters for all biomarkers, indexed in input
/// biomarker order.
#[derive(Debug, Clone, PartialEq)]
pub struct ThetaPhi {
    params: Vec<BiomarkerParams>,
}

impl ThetaPhi {
    #[must_use]
    pub const fn new(params: Vec<BiomarkerParams>) -> Self {
        Self { params }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[must_use]
    pub fn biomarker(&self, index: usize) -> &BiomarkerParams {
        &self.params[index]
    }

    pub fn set_biomarker(&mut self, index: usize, params: BiomarkerParams) {
        self.params[index] = params;
    }

    #[must_use]
    pub fn theta_log_density(&self, index: usize, value: f64) -> f64 {
        self.params[index].theta.log_density(value)
    }

    #[must_use]
    pub fn phi_log_density(&self, index: usize, value: f64) -> f64 {
        self.params[index].phi.log_density(value)
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, BiomarkerParams> {
        self.params.iter()
    }
}

impl<'a> IntoIterator for &'a ThetaPhi {
    type Item = &'a BiomarkerParams;
    type IntoIter = std::slice::Iter<'a, BiomarkerParams>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
