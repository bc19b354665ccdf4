//! Run-level bookkeeping.

use chrono::{DateTime, Utc};
use gt_types::{ParameterVector, TrialResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique optimization run identifier.
pub type OptimizationId = Uuid;

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub id: OptimizationId,
    pub strategy: String,
    pub state: OptimizationState,
    /// Trials that produced a finite loss.
    pub trials_completed: usize,
    /// Trials with no valid molecule (infinite loss).
    pub trials_failed: usize,
    /// Molecules skipped across all trials.
    pub items_skipped: usize,
    /// Summary or export writes that failed.
    pub write_failures: usize,
    pub best_loss: Option<f64>,
    pub best_parameters: Option<ParameterVector>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy: strategy.into(),
            state: OptimizationState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            items_skipped: 0,
            write_failures: 0,
            best_loss: None,
            best_parameters: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn trials_run(&self) -> usize {
        self.trials_completed + self.trials_failed
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizationState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = OptimizationState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.state = OptimizationState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = OptimizationState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a finished trial and keep the lowest finite loss.
    pub fn record(&mut self, result: &TrialResult) {
        self.items_skipped += result.skipped.len();
        if !result.is_viable() {
            self.trials_failed += 1;
            return;
        }
        self.trials_completed += 1;
        if self.best_loss.map_or(true, |best| result.loss < best) {
            self.best_loss = Some(result.loss);
            self.best_parameters = Some(result.parameters.clone());
        }
    }
}
