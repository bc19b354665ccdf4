//! Completion polling.
//!
//! The scheduler offers no completion callback, so the only signal is a
//! handle disappearing from the active queue. The poller queries every
//! waited handle once per pass and sleeps for a fixed interval between
//! passes. Each wait carries a per-job deadline and a cancellation token so a
//! stuck job fails soft instead of hanging the run.

use gt_types::{GtError, JobHandle, JobState};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::SchedulerClient;
use crate::job::Job;

/// Polling cadence and deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between full polling passes.
    pub interval_secs: u64,
    /// A job still listed this long after submission is marked timed out.
    /// `None` waits forever.
    pub job_timeout_secs: Option<u64>,
    /// Upper bound on a single status query.
    pub query_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            job_timeout_secs: Some(48 * 3600),
            query_timeout_secs: 60,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_job_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.job_timeout_secs = secs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("wait cancelled with {abandoned} job(s) still listed")]
    Cancelled { abandoned: usize },
}

impl From<WaitError> for GtError {
    fn from(_: WaitError) -> Self {
        GtError::Cancelled
    }
}

/// Jobs being waited on plus the ones that have settled.
///
/// Each trial owns its own set; sets are never shared between trials.
#[derive(Debug, Default)]
pub struct WaitSet {
    waiting: Vec<Job>,
    settled: Vec<Job>,
}

impl WaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job) {
        self.waiting.push(job);
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_idle(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Whether `handle` is already tracked, waiting or settled.
    pub fn contains(&self, handle: &JobHandle) -> bool {
        self.waiting
            .iter()
            .chain(self.settled.iter())
            .any(|job| &job.handle == handle)
    }

    pub fn settled(&self) -> &[Job] {
        &self.settled
    }

    /// All jobs, settled first. Jobs still waiting keep their last state.
    pub fn into_jobs(self) -> Vec<Job> {
        let mut jobs = self.settled;
        jobs.extend(self.waiting);
        jobs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Until {
    Any,
    All,
}

/// Waits for handles to leave the scheduler's active queue.
pub struct CompletionPoller<'a, S: SchedulerClient + ?Sized> {
    scheduler: &'a S,
    config: PollConfig,
    cancel: CancellationToken,
}

impl<'a, S: SchedulerClient + ?Sized> Clone for CompletionPoller<'a, S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler,
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<'a, S: SchedulerClient + ?Sized> CompletionPoller<'a, S> {
    pub fn new(scheduler: &'a S, config: PollConfig, cancel: CancellationToken) -> Self {
        Self {
            scheduler,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Block until every job in the set has settled.
    pub async fn wait_all(&self, set: &mut WaitSet) -> Result<usize, WaitError> {
        self.wait_until(set, Until::All).await
    }

    /// Block until at least one job has settled (or the set is empty).
    /// Returns how many settled.
    pub async fn wait_any(&self, set: &mut WaitSet) -> Result<usize, WaitError> {
        self.wait_until(set, Until::Any).await
    }

    async fn wait_until(&self, set: &mut WaitSet, until: Until) -> Result<usize, WaitError> {
        let mut settled = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.abandon(set));
            }

            settled += self.poll_pass(set).await;

            if set.is_idle() || (until == Until::Any && settled > 0) {
                return Ok(settled);
            }

            debug!(
                waiting = set.waiting_len(),
                interval_secs = self.config.interval_secs,
                "jobs still listed, sleeping"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.abandon(set)),
                _ = sleep(self.config.interval()) => {}
            }
        }
    }

    /// Query every waited handle once. Returns how many settled.
    ///
    /// A job past its deadline is cancelled at the scheduler but stays in the
    /// wait set, and so keeps its slot under the cap, until the query shows
    /// it gone. It then settles as `TimedOut`.
    async fn poll_pass(&self, set: &mut WaitSet) -> usize {
        let mut still_waiting = Vec::with_capacity(set.waiting.len());
        let mut settled = 0;

        for mut job in std::mem::take(&mut set.waiting) {
            let query = timeout(self.config.query_timeout(), self.scheduler.is_active(&job.handle));
            match query.await {
                Ok(Ok(false)) => {
                    if job.cancel_requested {
                        job.state = JobState::TimedOut;
                        info!(job_id = %job.handle, item = %job.item, "cancelled job left the queue");
                    } else {
                        job.state = JobState::Completed;
                        info!(job_id = %job.handle, item = %job.item, "job left the queue");
                    }
                    set.settled.push(job);
                    settled += 1;
                    continue;
                }
                Ok(Ok(true)) => {
                    if !job.cancel_requested {
                        job.state = JobState::Active;
                    }
                }
                Ok(Err(e)) => {
                    warn!(job_id = %job.handle, item = %job.item, error = %e, "status query failed, retrying next pass");
                }
                Err(_) => {
                    warn!(
                        job_id = %job.handle,
                        item = %job.item,
                        timeout_secs = self.config.query_timeout_secs,
                        "status query timed out, retrying next pass"
                    );
                }
            }

            let overdue = self
                .config
                .job_timeout()
                .is_some_and(|limit| job.submitted_at.elapsed() >= limit);
            if overdue && !job.cancel_requested {
                self.cancel_overdue(&mut job).await;
            }
            still_waiting.push(job);
        }

        set.waiting = still_waiting;
        settled
    }

    async fn cancel_overdue(&self, job: &mut Job) {
        let request = timeout(self.config.query_timeout(), self.scheduler.cancel(&job.handle));
        match request.await {
            Ok(Ok(())) => {
                job.cancel_requested = true;
                job.state = JobState::TimedOut;
                warn!(
                    job_id = %job.handle,
                    item = %job.item,
                    signature = %job.item.params.signature(),
                    "job exceeded its deadline, cancellation requested"
                );
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.handle, item = %job.item, error = %e, "cancelling overdue job failed, retrying next pass");
            }
            Err(_) => {
                warn!(job_id = %job.handle, item = %job.item, "cancel command timed out, retrying next pass");
            }
        }
    }

    fn abandon(&self, set: &mut WaitSet) -> WaitError {
        let abandoned = set.waiting.len();
        for mut job in std::mem::take(&mut set.waiting) {
            job.state = JobState::Unknown;
            set.settled.push(job);
        }
        warn!(abandoned, "wait cancelled");
        WaitError::Cancelled { abandoned }
    }
}
