//! One trial end to end: prepare, submit, wait, harvest, score, report.

use gt_data::{write_comparison, write_extracted, SummaryLog};
use gt_extract::ArtifactExtractor;
use gt_scheduler::{BatchSubmitter, CompletionPoller, SchedulerClient};
use gt_types::{
    expand_work_items, internal_error, BestResult, GtResult, ItemOutcome, ParameterVector, SkipReason,
    SkippedItem, TrialResult, WorkItem,
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::TuningConfig;
use crate::evaluator::TrialEvaluator;
use crate::input::InputPreparer;
use crate::retry::RetryCoordinator;

/// Evaluates parameter vectors against the configured molecules.
///
/// Item-level failures (preparation, submission, extraction) skip the
/// molecule and never abort the trial. Failures to write the summary or
/// exports are logged and counted, never returned. Only cancellation
/// surfaces as an error.
pub struct TrialPipeline<'a, S: SchedulerClient + ?Sized> {
    scheduler: &'a S,
    preparer: &'a dyn InputPreparer,
    evaluator: TrialEvaluator,
    config: &'a TuningConfig,
    summary: SummaryLog,
    cancel: CancellationToken,
}

impl<'a, S: SchedulerClient + ?Sized> TrialPipeline<'a, S> {
    pub fn new(
        scheduler: &'a S,
        preparer: &'a dyn InputPreparer,
        evaluator: TrialEvaluator,
        config: &'a TuningConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            preparer,
            evaluator,
            summary: SummaryLog::new(&config.summary_path),
            config,
            cancel,
        }
    }

    pub fn summary(&self) -> &SummaryLog {
        &self.summary
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Evaluate one parameter vector and persist the result.
    pub async fn run_trial(
        &self,
        trial_number: usize,
        params: ParameterVector,
        best: &mut BestResult,
    ) -> GtResult<TrialResult> {
        let result = self.evaluate_trial(trial_number, params, best).await?;
        self.persist(&result);
        Ok(result)
    }

    /// Append the trial to the summary and overwrite the exports. Returns how
    /// many of the outputs could not be written; each failure is logged.
    pub fn persist(&self, result: &TrialResult) -> usize {
        let mut failures = 0;
        let trial = result.trial_number;

        if let Err(e) = self.summary.append_trial(result) {
            error!(trial, path = %self.summary.path().display(), error = %e, "could not append trial summary");
            failures += 1;
        }
        if let Err(e) = write_extracted(&self.config.extracted_path, &result.parameters, &result.records) {
            error!(trial, path = %self.config.extracted_path.display(), error = %e, "could not write extracted values");
            failures += 1;
        }
        if let Some(path) = &self.config.comparison_path {
            if let Err(e) = write_comparison(path, &result.comparisons) {
                error!(trial, path = %path.display(), error = %e, "could not write comparison");
                failures += 1;
            }
        }
        failures
    }

    /// Prepare, submit, harvest and score one parameter vector without
    /// writing any output.
    pub async fn evaluate_trial(
        &self,
        trial_number: usize,
        params: ParameterVector,
        best: &mut BestResult,
    ) -> GtResult<TrialResult> {
        let root = &self.config.work_root;
        info!(trial = trial_number, params = %params, "starting trial");

        let mut skipped: Vec<SkippedItem> = Vec::new();
        let mut dropped: HashSet<String> = HashSet::new();

        // Prepare every input first; a molecule whose input cannot be
        // written is never submitted in any mode.
        let items = expand_work_items(&self.config.molecules, &self.config.modes, &params);
        for item in &items {
            if dropped.contains(&item.molecule) {
                continue;
            }
            if let Err(e) = self.preparer.prepare(item, root) {
                error!(item = %item, signature = %params.signature(), error = %e, "input preparation failed");
                dropped.insert(item.molecule.clone());
                skipped.push(SkippedItem {
                    molecule: item.molecule.clone(),
                    reason: SkipReason::PreparationFailed {
                        mode: item.mode,
                        message: e.to_string(),
                    },
                });
            }
        }
        let items: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| !dropped.contains(&item.molecule))
            .collect();

        let poller = CompletionPoller::new(self.scheduler, self.config.poll.clone(), self.cancel.clone());
        let submitter = BatchSubmitter::new(self.scheduler, poller, self.config.max_concurrent, root);
        let batch = submitter.submit_all(items).await?;
        info!(
            trial = trial_number,
            jobs = batch.jobs.len(),
            completed = batch.completed_count(),
            failed = batch.failed.len(),
            "batch settled"
        );

        for failed in &batch.failed {
            if dropped.insert(failed.item.molecule.clone()) {
                skipped.push(SkippedItem {
                    molecule: failed.item.molecule.clone(),
                    reason: SkipReason::SubmissionFailed {
                        mode: failed.item.mode,
                        message: failed.error.to_string(),
                    },
                });
            }
        }

        let harvestable: Vec<String> = self
            .config
            .molecules
            .iter()
            .filter(|m| !dropped.contains(*m))
            .cloned()
            .collect();
        let extractor = ArtifactExtractor::new(root);
        let retry = RetryCoordinator::new(&submitter, &extractor, self.config.max_attempts);
        let mut outcomes = retry.harvest(&harvestable, &params).await?;
        outcomes.extend(skipped.into_iter().map(ItemOutcome::Skipped));
        if outcomes.len() != self.config.molecules.len() {
            return Err(internal_error!(
                "trial {trial_number} accounted for {} of {} molecules",
                outcomes.len(),
                self.config.molecules.len()
            ));
        }

        let result = self.evaluator.evaluate(trial_number, params, outcomes, best);
        if !result.is_viable() {
            warn!(trial = trial_number, params = %result.parameters, "no valid molecules, infinite loss");
        }
        Ok(result)
    }
}
