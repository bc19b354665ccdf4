//! Bounded re-extraction with resubmission of failing modes.

use gt_extract::ArtifactExtractor;
use gt_scheduler::{BatchSubmitter, SchedulerClient, WaitError};
use gt_types::{
    ExtractionError, ItemOutcome, ParameterVector, SkipReason, SkippedItem, WorkItem,
};
use tracing::{info, warn};

/// Harvests records for a set of molecules, resubmitting the job of every
/// mode whose artifact could not be read.
///
/// Each round extracts every pending molecule, then resubmits all failing
/// modes as one bounded batch and waits for it. After `max_attempts`
/// extraction rounds the remaining molecules are skipped with the last
/// error seen.
pub struct RetryCoordinator<'a, S: SchedulerClient + ?Sized> {
    submitter: &'a BatchSubmitter<'a, S>,
    extractor: &'a ArtifactExtractor,
    max_attempts: usize,
}

impl<'a, S: SchedulerClient + ?Sized> RetryCoordinator<'a, S> {
    pub fn new(
        submitter: &'a BatchSubmitter<'a, S>,
        extractor: &'a ArtifactExtractor,
        max_attempts: usize,
    ) -> Self {
        Self {
            submitter,
            extractor,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// One outcome per molecule, in input order. Fails only if a wait for
    /// resubmitted jobs is cancelled.
    pub async fn harvest(
        &self,
        molecules: &[String],
        params: &ParameterVector,
    ) -> Result<Vec<ItemOutcome>, WaitError> {
        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; molecules.len()];
        let mut pending: Vec<usize> = (0..molecules.len()).collect();

        for attempt in 1..=self.max_attempts {
            let mut failing: Vec<(usize, Vec<ExtractionError>)> = Vec::new();
            for index in pending.drain(..) {
                let molecule = &molecules[index];
                match self.extractor.extract(molecule, params) {
                    Ok(record) => {
                        if attempt > 1 {
                            info!(molecule = %molecule, attempt, "extracted after resubmission");
                        }
                        outcomes[index] = Some(ItemOutcome::Extracted(record));
                    }
                    Err(errors) => failing.push((index, errors)),
                }
            }

            if failing.is_empty() {
                break;
            }

            if attempt == self.max_attempts {
                for (index, errors) in failing {
                    outcomes[index] = Some(self.exhausted(&molecules[index], params, &errors));
                }
                break;
            }

            let mut resubmit = Vec::new();
            for (index, errors) in &failing {
                for error in errors {
                    warn!(
                        molecule = %molecules[*index],
                        signature = %params.signature(),
                        mode = %error.mode,
                        path = %error.path.display(),
                        kind = ?error.kind,
                        attempt,
                        "extraction failed, resubmitting"
                    );
                    resubmit.push(WorkItem::new(molecules[*index].clone(), error.mode, params.clone()));
                }
            }

            let batch = self.submitter.submit_all(resubmit).await?;
            for failed in &batch.failed {
                warn!(
                    item = %failed.item,
                    error = %failed.error,
                    "resubmission failed, retrying extraction anyway"
                );
            }
            pending = failing.into_iter().map(|(index, _)| index).collect();
        }

        Ok(outcomes.into_iter().flatten().collect())
    }

    fn exhausted(
        &self,
        molecule: &str,
        params: &ParameterVector,
        errors: &[ExtractionError],
    ) -> ItemOutcome {
        for error in errors {
            warn!(
                molecule,
                signature = %params.signature(),
                mode = %error.mode,
                path = %error.path.display(),
                kind = ?error.kind,
                attempts = self.max_attempts,
                "extraction attempts exhausted, molecule skipped"
            );
        }
        // Report the last failing mode, triplet when both failed.
        let reason = match errors.last() {
            Some(error) => SkipReason::ExtractionExhausted {
                attempts: self.max_attempts,
                mode: error.mode,
                kind: error.kind,
            },
            None => SkipReason::ExtractionExhausted {
                attempts: self.max_attempts,
                mode: gt_types::Mode::Singlet,
                kind: gt_types::ExtractionErrorKind::MissingArtifact,
            },
        };
        ItemOutcome::Skipped(SkippedItem {
            molecule: molecule.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt_scheduler::{CompletionPoller, PollConfig, SimulatedScheduler, SubmitRequest};
    use gt_types::{ExtractionErrorKind, Mode};
    use std::fs;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    const SINGLET: &str = "  1  A  -100.00\n  2  A  -99.95\n ddikick.x: exited gracefully.\n";
    const TRIPLET: &str = "  1  A  -99.94\n ddikick.x: exited gracefully.\n";

    fn params() -> ParameterVector {
        ParameterVector::new([("a1", 0.5)])
    }

    fn write_artifact(root: &Path, molecule: &str, mode: Mode) {
        let item = WorkItem::new(molecule, mode, params());
        let path = item.artifact_path(root);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body = match mode {
            Mode::Singlet => SINGLET,
            Mode::Triplet => TRIPLET,
        };
        fs::write(path, body).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn complete_artifacts_need_no_resubmission() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "A", Mode::Singlet);
        write_artifact(root.path(), "A", Mode::Triplet);

        let scheduler = SimulatedScheduler::new(1);
        let poller = CompletionPoller::new(&scheduler, PollConfig::default(), CancellationToken::new());
        let submitter = BatchSubmitter::new(&scheduler, poller, 2, root.path());
        let extractor = ArtifactExtractor::new(root.path());
        let retry = RetryCoordinator::new(&submitter, &extractor, 2);

        let outcomes = retry.harvest(&["A".to_string()], &params()).await.unwrap();
        assert!(outcomes[0].record().is_some());
        assert!(scheduler.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn only_failing_mode_is_resubmitted() {
        let root = tempfile::tempdir().unwrap();
        write_artifact(root.path(), "A", Mode::Singlet);

        let artifact_root = root.path().to_path_buf();
        let scheduler = SimulatedScheduler::new(1).with_hook(move |request: &SubmitRequest| {
            if request.input_file.ends_with("_T.inp") {
                write_artifact(&artifact_root, "A", Mode::Triplet);
            }
        });
        let poller = CompletionPoller::new(&scheduler, PollConfig::default(), CancellationToken::new());
        let submitter = BatchSubmitter::new(&scheduler, poller, 2, root.path());
        let extractor = ArtifactExtractor::new(root.path());
        let retry = RetryCoordinator::new(&submitter, &extractor, 2);

        let outcomes = retry.harvest(&["A".to_string()], &params()).await.unwrap();
        assert!(outcomes[0].record().is_some());
        assert_eq!(scheduler.submissions().len(), 1);
        assert_eq!(scheduler.submission_count("A_a1_0.50_T.inp"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_molecule_is_skipped_with_last_error() {
        let root = tempfile::tempdir().unwrap();
        let scheduler = SimulatedScheduler::new(0);
        let poller = CompletionPoller::new(&scheduler, PollConfig::default(), CancellationToken::new());
        let submitter = BatchSubmitter::new(&scheduler, poller, 4, root.path());
        let extractor = ArtifactExtractor::new(root.path());
        let retry = RetryCoordinator::new(&submitter, &extractor, 3);

        let outcomes = retry.harvest(&["B".to_string()], &params()).await.unwrap();
        match &outcomes[0] {
            ItemOutcome::Skipped(SkippedItem {
                reason: SkipReason::ExtractionExhausted { attempts, mode, kind },
                ..
            }) => {
                assert_eq!(*attempts, 3);
                assert_eq!(*mode, Mode::Triplet);
                assert_eq!(*kind, ExtractionErrorKind::MissingArtifact);
            }
            other => panic!("expected exhausted skip, got {other:?}"),
        }
        // Both modes resubmitted on each of the two retry rounds.
        assert_eq!(scheduler.submissions().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_resubmission_wait_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = SimulatedScheduler::new(3);
        let poller = CompletionPoller::new(&scheduler, PollConfig::default(), cancel);
        let submitter = BatchSubmitter::new(&scheduler, poller, 4, root.path());
        let extractor = ArtifactExtractor::new(root.path());
        let retry = RetryCoordinator::new(&submitter, &extractor, 2);

        let result = retry.harvest(&["A".to_string()], &params()).await;
        assert!(matches!(result, Err(WaitError::Cancelled { .. })));
    }
}
