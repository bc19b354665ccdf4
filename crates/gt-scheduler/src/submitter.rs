//! Bounded-concurrency batch submission.

use gt_types::{JobState, Mode, SubmissionError, WorkItem};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::client::{SchedulerClient, SubmitRequest};
use crate::job::Job;
use crate::poller::{CompletionPoller, WaitError, WaitSet};

/// A work item the scheduler refused. Never part of any wait set.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSubmission {
    pub item: WorkItem,
    pub error: SubmissionError,
}

/// Result of a batch: every submitted job in its settled state, plus the
/// items that never got a handle.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub jobs: Vec<Job>,
    pub failed: Vec<FailedSubmission>,
}

impl BatchOutcome {
    pub fn jobs_for_mode(&self, mode: Mode) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(move |job| job.item.mode == mode)
    }

    pub fn job_for(&self, molecule: &str, mode: Mode) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|job| job.item.molecule == molecule && job.item.mode == mode)
    }

    pub fn failure_for(&self, molecule: &str, mode: Mode) -> Option<&FailedSubmission> {
        self.failed
            .iter()
            .find(|f| f.item.molecule == molecule && f.item.mode == mode)
    }

    pub fn completed_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.state == JobState::Completed)
            .count()
    }
}

/// Submits work items one at a time, never keeping more than
/// `max_concurrent` of them listed at the scheduler.
pub struct BatchSubmitter<'a, S: SchedulerClient + ?Sized> {
    scheduler: &'a S,
    poller: CompletionPoller<'a, S>,
    max_concurrent: usize,
    root: PathBuf,
}

impl<'a, S: SchedulerClient + ?Sized> BatchSubmitter<'a, S> {
    pub fn new(
        scheduler: &'a S,
        poller: CompletionPoller<'a, S>,
        max_concurrent: usize,
        root: impl AsRef<Path>,
    ) -> Self {
        Self {
            scheduler,
            poller,
            max_concurrent: max_concurrent.max(1),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Submit every item, blocking whenever the cap is reached, then wait for
    /// the remainder. Fails only if the wait is cancelled.
    pub async fn submit_all(&self, items: Vec<WorkItem>) -> Result<BatchOutcome, WaitError> {
        let mut set = WaitSet::new();
        let mut failed = Vec::new();

        for item in items {
            if let Err(error) = self.clear_artifact(&item) {
                error!(item = %item, error = %error, "stale artifact left in place, item dropped");
                failed.push(FailedSubmission { item, error });
                continue;
            }

            let request = SubmitRequest::for_item(&item, &self.root);
            match self.scheduler.submit(&request).await {
                Ok(handle) if set.contains(&handle) => {
                    let error = SubmissionError::Rejected {
                        message: format!("scheduler reused job id {handle}"),
                    };
                    error!(item = %item, error = %error, "duplicate job handle, item dropped");
                    failed.push(FailedSubmission { item, error });
                    continue;
                }
                Ok(handle) => {
                    info!(item = %item, job_id = %handle, "job submitted");
                    set.push(Job::new(handle, item));
                }
                Err(error) => {
                    error!(
                        item = %item,
                        signature = %item.params.signature(),
                        input = %request.input_file,
                        error = %error,
                        "submission failed, item dropped from wait set"
                    );
                    failed.push(FailedSubmission { item, error });
                    continue;
                }
            }

            while set.waiting_len() >= self.max_concurrent {
                info!(
                    active = set.waiting_len(),
                    cap = self.max_concurrent,
                    "concurrency cap reached, waiting for a free slot"
                );
                self.poller.wait_any(&mut set).await?;
            }
        }

        if !set.is_idle() {
            info!(remaining = set.waiting_len(), "waiting for remaining jobs");
        }
        self.poller.wait_all(&mut set).await?;

        Ok(BatchOutcome {
            jobs: set.into_jobs(),
            failed,
        })
    }

    /// Remove a log left by an earlier job for the same item, so a job that
    /// dies without writing one is never scored from the old file.
    fn clear_artifact(&self, item: &WorkItem) -> Result<(), SubmissionError> {
        let path = item.artifact_path(&self.root);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(item = %item, path = %path.display(), "removed previous artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SubmissionError::StaleArtifact {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }
}
