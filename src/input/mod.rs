//! # Model inputs
//!
//! Defines the cross-sectional measurement containers consumed by the
//! event-based model: a long-format record type and a validated wide
//! table with one row per participant and one column per biomarker.
//!
//! # Examples
//!
//! ```
//! use event_based_models::{EbmInput, MeasurementRecord};
//!
//! let records = vec![
//!     MeasurementRecord::new(1, "hippocampus", 0.4, false),
//!     MeasurementRecord::new(1, "tau", 1.1, false),
//!     MeasurementRecord::new(2, "hippocampus", 3.9, true),
//!     MeasurementRecord::new(2, "tau", 4.2, true),
//! ];
//! let input = EbmInput::from_records(&records).unwrap();
//!
//! assert_eq!(input.n_participants(), 2);
//! assert_eq!(input.n_biomarkers(), 2);
//! ```

use faer::Mat;
use thiserror::Error;

/// Errors returned when assembling or validating model inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("input must contain at least one measurement record")]
    NoRecords,
    #[error("input must contain at least one biomarker")]
    EmptyBiomarkers,
    #[error("biomarker name {biomarker:?} appears more than once")]
    DuplicateBiomarker { biomarker: String },
    #[error("participant id {participant_id} appears more than once")]
    DuplicateParticipant { participant_id: u64 },
    #[error("participant {participant_id} has more than one record for biomarker {biomarker:?}")]
    DuplicateMeasurement {
        participant_id: u64,
        biomarker: String,
    },
    #[error("participant {participant_id} is missing a record for biomarker {biomarker:?}")]
    MissingMeasurement {
        participant_id: u64,
        biomarker: String,
    },
    #[error("participant {participant_id} carries conflicting disease labels")]
    InconsistentDiseaseLabel { participant_id: u64 },
    #[error("participant {participant_id} has a non-finite value for biomarker {biomarker:?}")]
    NonFiniteMeasurement {
        participant_id: u64,
        biomarker: String,
    },
    #[error(
        "measurement matrix is {rows}x{cols} but there are {participants} participants and {biomarkers} biomarkers"
    )]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        participants: usize,
        biomarkers: usize,
    },
    #[error("disease label length ({len}) must equal number of participants ({participants})")]
    InvalidDiseasedLength { len: usize, participants: usize },
}

/// One observed biomarker value for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub participant_id: u64,
    pub biomarker: String,
    pub value: f64,
    pub diseased: bool,
}

impl MeasurementRecord {
    #[must_use]
    pub fn new(participant_id: u64, biomarker: &str, value: f64, diseased: bool) -> Self {
        Self {
            participant_id,
            biomarker: biomarker.to_owned(),
            value,
            diseased,
        }
    }
}

/// Validated wide-format input: one row per participant, one column per
/// biomarker, plus a disease label per participant.
#[derive(Debug, Clone)]
pub struct EbmInput {
    pub biomarkers: Vec<String>,
    pub participant_ids: Vec<u64>,
    pub measurements: Mat<f64>,
    pub diseased: Vec<bool>,
}

impl EbmInput {
    #[must_use]
    pub const fn new(
        biomarkers: Vec<String>,
        participant_ids: Vec<u64>,
        measurements: Mat<f64>,
        diseased: Vec<bool>,
    ) -> Self {
        Self {
            biomarkers,
            participant_ids,
            measurements,
            diseased,
        }
    }

    /// Pivot long-format records into a wide table.
    ///
    /// Biomarkers and participants keep their first-appearance order, so
    /// the same record set always produces the same column layout.
    ///
    /// # Errors
    ///
    /// Returns `InputError` on duplicate or missing cells, conflicting
    /// disease labels, or non-finite values.
    pub fn from_records(records: &[MeasurementRecord]) -> Result<Self, InputError> {
        if records.is_empty() {
            return Err(InputError::NoRecords);
        }

        let mut biomarkers: Vec<String> = Vec::new();
        let mut participant_ids: Vec<u64> = Vec::new();
        let mut diseased: Vec<bool> = Vec::new();

        for record in records {
            if !biomarkers.iter().any(|name| *name == record.biomarker) {
                biomarkers.push(record.biomarker.clone());
            }
            match participant_ids
                .iter()
                .position(|id| *id == record.participant_id)
            {
                Some(row) => {
                    if diseased[row] != record.diseased {
                        return Err(InputError::InconsistentDiseaseLabel {
                            participant_id: record.participant_id,
                        });
                    }
                }
                None => {
                    participant_ids.push(record.participant_id);
                    diseased.push(record.diseased);
                }
            }
        }

        let n_participants = participant_ids.len();
        let n_biomarkers = biomarkers.len();
        let mut cells: Vec<Option<f64>> = vec![None; n_participants * n_biomarkers];

        for record in records {
            let row = participant_ids
                .iter()
                .position(|id| *id == record.participant_id)
                .unwrap_or(0);
            let col = biomarkers
                .iter()
                .position(|name| *name == record.biomarker)
                .unwrap_or(0);
            let cell = &mut cells[row * n_biomarkers + col];
            if cell.is_some() {
                return Err(InputError::DuplicateMeasurement {
                    participant_id: record.participant_id,
                    biomarker: record.biomarker.clone(),
                });
            }
            *cell = Some(record.value);
        }

        for row in 0..n_participants {
            for col in 0..n_biomarkers {
                if cells[row * n_biomarkers + col].is_none() {
                    return Err(InputError::MissingMeasurement {
                        participant_id: participant_ids[row],
                        biomarker: biomarkers[col].clone(),
                    });
                }
            }
        }

        let measurements = Mat::from_fn(n_participants, n_biomarkers, |row, col| {
            cells[row * n_biomarkers + col].unwrap_or(f64::NAN)
        });

        let input = Self::new(biomarkers, participant_ids, measurements, diseased);
        input.validate()?;
        Ok(input)
    }

    /// # Errors
    ///
    /// Returns `InputError` if shapes, names, or values are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.biomarkers.is_empty() {
            return Err(InputError::EmptyBiomarkers);
        }
        for (idx, name) in self.biomarkers.iter().enumerate() {
            if self.biomarkers[..idx].contains(name) {
                return Err(InputError::DuplicateBiomarker {
                    biomarker: name.clone(),
                });
            }
        }
        for (idx, id) in self.participant_ids.iter().enumerate() {
            if self.participant_ids[..idx].contains(id) {
                return Err(InputError::DuplicateParticipant {
                    participant_id: *id,
                });
            }
        }
        if self.measurements.nrows() != self.participant_ids.len()
            || self.measurements.ncols() != self.biomarkers.len()
        {
            return Err(InputError::DimensionMismatch {
                rows: self.measurements.nrows(),
                cols: self.measurements.ncols(),
                participants: self.participant_ids.len(),
                biomarkers: self.biomarkers.len(),
            });
        }
        if self.diseased.len() != self.participant_ids.len() {
            return Err(InputError::InvalidDiseasedLength {
                len: self.diseased.len(),
                participants: self.participant_ids.len(),
            });
        }
        for row in 0..self.measurements.nrows() {
            for col in 0..self.measurements.ncols() {
                if !self.measurements[(row, col)].is_finite() {
                    return Err(InputError::NonFiniteMeasurement {
                        participant_id: self.participant_ids[row],
                        biomarker: self.biomarkers[col].clone(),
                    });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn n_participants(&self) -> usize {
        self.participant_ids.len()
    }

    #[must_use]
    pub const fn n_biomarkers(&self) -> usize {
        self.biomarkers.len()
    }

    /// Number of diseased stages. Stage 0 (no biomarker abnormal) is
    /// implicit, so participants range over `0..=n_stages()`.
    #[must_use]
    pub const fn n_stages(&self) -> usize {
        self.biomarkers.len()
    }

    #[must_use]
    pub fn n_diseased(&self) -> usize {
        self.diseased.iter().filter(|flag| **flag).count()
    }

    #[must_use]
    pub fn n_healthy(&self) -> usize {
        self.diseased.iter().filter(|flag| !**flag).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> Vec<MeasurementRecord> {
        vec![
            MeasurementRecord::new(10, "a", 1.0, false),
            MeasurementRecord::new(10, "b", 2.0, false),
            MeasurementRecord::new(20, "a", 3.0, true),
            MeasurementRecord::new(20, "b", 4.0, true),
        ]
    }

    #[test]
    fn from_records_preserves_first_appearance_order() {
        let input = EbmInput::from_records(&two_by_two()).expect("valid input");
        assert_eq!(input.biomarkers, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(input.participant_ids, vec![10, 20]);
        assert!((input.measurements[(1, 1)] - 4.0).abs() < 1.0e-12);
        assert_eq!(input.n_diseased(), 1);
        assert_eq!(input.n_healthy(), 1);
    }

    #[test]
    fn from_records_rejects_duplicate_cell() {
        let mut records = two_by_two();
        records.push(MeasurementRecord::new(10, "a", 9.0, false));
        let err = EbmInput::from_records(&records).expect_err("duplicate cell");
        assert!(matches!(err, InputError::DuplicateMeasurement { .. }));
    }

    #[test]
    fn from_records_rejects_missing_cell() {
        let mut records = two_by_two();
        records.pop();
        let err = EbmInput::from_records(&records).expect_err("missing cell");
        assert!(matches!(err, InputError::MissingMeasurement { .. }));
    }

    #[test]
    fn from_records_rejects_conflicting_labels() {
        let mut records = two_by_two();
        records[1].diseased = true;
        let err = EbmInput::from_records(&records).expect_err("conflicting labels");
        assert!(matches!(
            err,
            InputError::InconsistentDiseaseLabel { participant_id: 10 }
        ));
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let mut records = two_by_two();
        records[2].value = f64::NAN;
        let err = EbmInput::from_records(&records).expect_err("non-finite value");
        assert!(matches!(err, InputError::NonFiniteMeasurement { .. }));
    }

    #[test]
    fn validate_rejects_empty_records() {
        assert!(matches!(
            EbmInput::from_records(&[]),
            Err(InputError::NoRecords)
        ));
    }
}
