//! Scoring of extracted records against reference energies.

use chrono::Utc;
use gt_data::ReferenceTable;
use gt_types::{
    ArtifactRecord, BestResult, ComparisonRow, ItemOutcome, ParameterVector, SkippedItem,
    TrialResult,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Root-mean-square and mean absolute error of `diffs`, `None` when empty.
pub fn rmse_mae(diffs: &[f64]) -> Option<(f64, f64)> {
    if diffs.is_empty() {
        return None;
    }
    let n = diffs.len() as f64;
    let mse = diffs.iter().map(|d| d * d).sum::<f64>() / n;
    let mae = diffs.iter().map(|d| d.abs()).sum::<f64>() / n;
    Some((mse.sqrt(), mae))
}

/// Compares trial records with a reference table. Holds no state between
/// trials; the best result lives with the caller.
#[derive(Debug, Clone)]
pub struct TrialEvaluator {
    references: ReferenceTable,
}

impl TrialEvaluator {
    pub fn new(references: ReferenceTable) -> Self {
        Self { references }
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// One comparison row per record. A record without both reference
    /// values, or with a non-negative gap, is kept but marked invalid.
    pub fn compare(&self, records: &[ArtifactRecord]) -> Vec<ComparisonRow> {
        records
            .iter()
            .map(|record| {
                let reference = self.references.get(&record.molecule);
                let s1_reference = reference.map(|r| r.s1);
                let t1_reference = reference.map(|r| r.t1);
                let gap_diff = reference.map(|r| (record.gap_ev - r.gap()).abs());
                if reference.is_none() {
                    debug!(molecule = %record.molecule, "no reference values, item unscored");
                }
                ComparisonRow {
                    molecule: record.molecule.clone(),
                    s1_calculated: record.s1_ev,
                    s1_reference,
                    s1_diff: s1_reference.map(|r| (record.s1_ev - r).abs()),
                    t1_calculated: record.t1_ev,
                    t1_reference,
                    t1_diff: t1_reference.map(|r| (record.t1_ev - r).abs()),
                    gap_diff,
                    valid: record.valid && reference.is_some(),
                }
            })
            .collect()
    }

    /// Gap differences of valid rows, in row order.
    pub fn valid_differences(rows: &[ComparisonRow]) -> Vec<f64> {
        rows.iter()
            .filter(|row| row.valid)
            .filter_map(|row| row.gap_diff)
            .collect()
    }

    /// Score a trial and offer it to `best`. An empty valid set scores an
    /// infinite loss and never displaces the best.
    pub fn evaluate(
        &self,
        trial_number: usize,
        parameters: ParameterVector,
        outcomes: Vec<ItemOutcome>,
        best: &mut BestResult,
    ) -> TrialResult {
        let mut records = Vec::new();
        let mut skipped: Vec<SkippedItem> = Vec::new();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Extracted(record) => records.push(record),
                ItemOutcome::Skipped(item) => skipped.push(item),
            }
        }

        let comparisons = self.compare(&records);
        let scores = rmse_mae(&Self::valid_differences(&comparisons));
        let loss = scores.map_or(f64::INFINITY, |(rmse, _)| rmse);

        let result = TrialResult {
            trial_id: Uuid::new_v4(),
            trial_number,
            parameters,
            rmse: scores.map(|(rmse, _)| rmse),
            mae: scores.map(|(_, mae)| mae),
            loss,
            comparisons,
            records,
            skipped,
            finished_at: Utc::now(),
        };

        let improved = best.observe(&result);
        info!(
            trial = trial_number,
            params = %result.parameters,
            loss = result.loss,
            valid = result.comparisons.iter().filter(|r| r.valid).count(),
            skipped = result.skipped.len(),
            improved,
            "trial evaluated"
        );
        result
    }
}
