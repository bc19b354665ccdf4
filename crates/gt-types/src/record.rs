use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ExtractionErrorKind;
use crate::params::ParameterVector;
use crate::work::Mode;

/// Values harvested from the singlet and triplet artifacts of one molecule.
///
/// Raw energies are in Hartree, derived excitation energies in eV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub molecule: String,
    pub s0: f64,
    pub s1: f64,
    pub t1: f64,
    pub s1_ev: f64,
    pub t1_ev: f64,
    pub gap_ev: f64,
    /// A non-negative gap marks an unphysical configuration; such records
    /// are kept for reporting but excluded from scoring.
    pub valid: bool,
}

/// Why a molecule produced no record in a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    PreparationFailed { mode: Mode, message: String },
    SubmissionFailed { mode: Mode, message: String },
    ExtractionExhausted {
        attempts: usize,
        mode: Mode,
        kind: ExtractionErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub molecule: String,
    pub reason: SkipReason,
}

/// Result of harvesting one molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemOutcome {
    Extracted(ArtifactRecord),
    Skipped(SkippedItem),
}

impl ItemOutcome {
    pub fn molecule(&self) -> &str {
        match self {
            Self::Extracted(record) => &record.molecule,
            Self::Skipped(skipped) => &skipped.molecule,
        }
    }

    pub fn record(&self) -> Option<&ArtifactRecord> {
        match self {
            Self::Extracted(record) => Some(record),
            Self::Skipped(_) => None,
        }
    }
}

/// Per-molecule comparison against reference values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub molecule: String,
    pub s1_calculated: f64,
    pub s1_reference: Option<f64>,
    pub s1_diff: Option<f64>,
    pub t1_calculated: f64,
    pub t1_reference: Option<f64>,
    pub t1_diff: Option<f64>,
    pub gap_diff: Option<f64>,
    /// Negative gap and both references present.
    pub valid: bool,
}

/// Outcome of evaluating one parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    pub parameters: ParameterVector,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    /// RMSE, or `f64::INFINITY` when no record was valid.
    pub loss: f64,
    pub comparisons: Vec<ComparisonRow>,
    pub records: Vec<ArtifactRecord>,
    pub skipped: Vec<SkippedItem>,
    pub finished_at: DateTime<Utc>,
}

impl TrialResult {
    /// Whether the trial produced a usable score.
    pub fn is_viable(&self) -> bool {
        self.loss.is_finite()
    }
}

/// Running minimum over all trials of a process, by loss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestResult {
    best: Option<TrialResult>,
}

/// Best-so-far state shared between concurrently running evaluators.
pub type SharedBest = Arc<Mutex<BestResult>>;

impl BestResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loss(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |b| b.loss)
    }

    pub fn get(&self) -> Option<&TrialResult> {
        self.best.as_ref()
    }

    /// Record `result` if it strictly improves on the current best.
    /// Infinite-loss trials are never recorded.
    pub fn observe(&mut self, result: &TrialResult) -> bool {
        if result.is_viable() && result.loss < self.loss() {
            self.best = Some(result.clone());
            true
        } else {
            false
        }
    }

    pub fn into_shared(self) -> SharedBest {
        Arc::new(Mutex::new(self))
    }
}
