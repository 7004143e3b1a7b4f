//! Biomarker ordering: a bijection from biomarkers to stages 1..=N and
//! the randomized proposal perturbation used by the sampler.

use std::collections::BTreeMap;

use rand::RngExt;
use rand::rngs::StdRng;

use super::types::EbmError;

const DERANGEMENT_RETRIES: usize = 64;

/// A total assignment of stages 1..=N to N biomarkers.
///
/// `stages()[i]` is the stage at which biomarker `i` (in input column
/// order) becomes abnormal. Every stage appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiomarkerOrder {
    stages: Vec<usize>,
}

impl BiomarkerOrder {
    /// # Errors
    ///
    /// Returns `EbmError::InvalidOrder` unless `stages` is a bijection
    /// onto 1..=N.
    pub fn from_stages(stages: Vec<usize>) -> Result<Self, EbmError> {
        let n = stages.len();
        let mut seen = vec![false; n];
        for stage in &stages {
            if *stage == 0 || *stage > n || seen[*stage - 1] {
                return Err(EbmError::InvalidOrder { n_biomarkers: n });
            }
            seen[*stage - 1] = true;
        }
        Ok(Self { stages })
    }

    /// Uniform random order over N biomarkers.
    #[must_use]
    pub fn random(n_biomarkers: usize, rng: &mut StdRng) -> Self {
        let mut stages: Vec<usize> = (1..=n_biomarkers).collect();
        fisher_yates(&mut stages, rng);
        Self { stages }
    }

    #[must_use]
    pub fn stages(&self) -> &[usize] {
        &self.stages
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage assigned to biomarker `index`.
    #[must_use]
    pub fn stage_of(&self, index: usize) -> usize {
        self.stages[index]
    }

    /// Biomarker index holding each stage: `result[s - 1]` is the
    /// biomarker that becomes abnormal at stage `s`.
    #[must_use]
    pub fn biomarker_at_stage(&self) -> Vec<usize> {
        let mut by_stage = vec![0usize; self.stages.len()];
        for (index, stage) in self.stages.iter().enumerate() {
            by_stage[stage - 1] = index;
        }
        by_stage
    }

    /// Name-keyed view for reports.
    #[must_use]
    pub fn named(&self, biomarkers: &[String]) -> BTreeMap<String, usize> {
        biomarkers
            .iter()
            .cloned()
            .zip(self.stages.iter().copied())
            .collect()
    }

    /// Propose a perturbed order: `n_shuffle` distinct positions are
    /// selected and their stage values deranged, so every selected
    /// position changes while the rest of the order is untouched. The
    /// same path serves local perturbations and whole-order shuffles
    /// (`n_shuffle == len`).
    #[must_use]
    pub fn propose(&self, n_shuffle: usize, rng: &mut StdRng) -> Self {
        debug_assert!(n_shuffle >= 2 && n_shuffle <= self.stages.len());

        let positions = sample_distinct_positions(self.stages.len(), n_shuffle, rng);
        let original: Vec<usize> = positions.iter().map(|&p| self.stages[p]).collect();
        let mut shuffled = original.clone();

        let mut deranged = false;
        for _ in 0..DERANGEMENT_RETRIES {
            fisher_yates(&mut shuffled, rng);
            if shuffled.iter().zip(&original).all(|(new, old)| new != old) {
                deranged = true;
                break;
            }
        }
        if !deranged {
            // All selected values are distinct stages, so a rotation is
            // always a derangement.
            shuffled.copy_from_slice(&original);
            shuffled.rotate_left(1);
        }

        let mut stages = self.stages.clone();
        for (slot, value) in positions.iter().zip(shuffled) {
            stages[*slot] = value;
        }
        Self { stages }
    }
}

fn fisher_yates(values: &mut [usize], rng: &mut StdRng) {
    for i in (1..values.len()).rev() {
        let j = rng.random_range(0..=i);
        values.swap(i, j);
    }
}

/// First `k` entries of a partially shuffled index vector, sorted for a
/// deterministic write-back order.
fn sample_distinct_positions(n: usize, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.random_range(i..n);
        indices.swap(i, j);
    }
    let mut selected = indices[..k].to_vec();
    selected.sort_unstable();
    selected
}
