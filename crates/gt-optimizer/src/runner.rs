use gt_scheduler::SchedulerClient;
use gt_types::{BestResult, GtError, GtResult};
use tracing::{error, info, warn};

use crate::pipeline::TrialPipeline;
use crate::search::SearchStrategy;
use crate::trial::OptimizationStatus;

/// Drives a search strategy through the trial pipeline and owns the best
/// result of the run.
pub struct OptimizationRunner {
    strategy: Box<dyn SearchStrategy>,
    max_trials: usize,
    best: BestResult,
    status: OptimizationStatus,
}

impl OptimizationRunner {
    pub fn new(strategy: Box<dyn SearchStrategy>, max_trials: usize) -> Self {
        let status = OptimizationStatus::new(strategy.name());
        Self {
            strategy,
            max_trials,
            best: BestResult::new(),
            status,
        }
    }

    pub fn best(&self) -> &BestResult {
        &self.best
    }

    pub fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    /// Run until `max_trials`, strategy exhaustion or cancellation. The best
    /// block is appended to the summary on every exit path.
    pub async fn run<S: SchedulerClient + ?Sized>(
        &mut self,
        pipeline: &TrialPipeline<'_, S>,
    ) -> GtResult<&OptimizationStatus> {
        self.status.mark_running();
        info!(
            run = %self.status.id,
            strategy = self.strategy.name(),
            max_trials = self.max_trials,
            "optimization started"
        );

        let outcome = self.run_trials(pipeline).await;
        match &outcome {
            Ok(()) => self.status.mark_completed(),
            Err(GtError::Cancelled) => {
                warn!(trials = self.status.trials_run(), "run cancelled");
                self.status.mark_cancelled();
            }
            Err(e) => {
                error!(error = %e, "run aborted");
                self.status.mark_failed(e.to_string());
            }
        }

        if let Err(e) = pipeline.summary().append_best(self.best.get()) {
            error!(
                path = %pipeline.summary().path().display(),
                error = %e,
                "could not append best result"
            );
            self.status.write_failures += 1;
        }
        info!(
            state = ?self.status.state,
            completed = self.status.trials_completed,
            failed = self.status.trials_failed,
            skipped_items = self.status.items_skipped,
            write_failures = self.status.write_failures,
            best_loss = self.best.loss(),
            "optimization finished"
        );

        match outcome {
            Ok(()) | Err(GtError::Cancelled) => Ok(&self.status),
            Err(e) => Err(e),
        }
    }

    async fn run_trials<S: SchedulerClient + ?Sized>(
        &mut self,
        pipeline: &TrialPipeline<'_, S>,
    ) -> GtResult<()> {
        for trial_number in 1..=self.max_trials {
            if pipeline.cancel_token().is_cancelled() {
                return Err(GtError::Cancelled);
            }
            let Some(params) = self.strategy.suggest(1).pop() else {
                info!(trials = trial_number - 1, "search space exhausted");
                break;
            };

            let result = pipeline
                .evaluate_trial(trial_number, params, &mut self.best)
                .await?;
            self.strategy.report(&result.parameters, result.loss);
            self.status.record(&result);
            self.status.write_failures += pipeline.persist(&result);
        }
        Ok(())
    }
}
