//! Simulated (in-process) scheduler.
//!
//! Runs no external commands. Each job stays listed for a fixed number of
//! status queries, an optional hook fires on every submission (for example to
//! write the artifact the real job would produce), and selected input files
//! can be made to fail submission. Records every submission and the peak
//! number of simultaneously listed jobs.

use async_trait::async_trait;
use gt_types::{JobHandle, PollingError, SubmissionError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::client::{SchedulerClient, SubmitRequest};

type SubmitHook = Box<dyn Fn(&SubmitRequest) + Send + Sync>;

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    listed: HashMap<JobHandle, usize>,
    submissions: Vec<SubmitRequest>,
    peak_listed: usize,
    queries: usize,
    cancelled: Vec<JobHandle>,
}

pub struct SimulatedScheduler {
    polls_until_done: usize,
    hook: Option<SubmitHook>,
    rejected_inputs: HashSet<String>,
    state: Mutex<SimState>,
}

impl SimulatedScheduler {
    /// A job is reported active for `polls_until_done` queries, then gone.
    pub fn new(polls_until_done: usize) -> Self {
        Self {
            polls_until_done,
            hook: None,
            rejected_inputs: HashSet::new(),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn with_hook(mut self, hook: impl Fn(&SubmitRequest) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Every submission of this input file name fails.
    pub fn reject_input(mut self, input_file: impl Into<String>) -> Self {
        self.rejected_inputs.insert(input_file.into());
        self
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state.lock().submissions.clone()
    }

    pub fn submission_count(&self, input_file: &str) -> usize {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|r| r.input_file == input_file)
            .count()
    }

    /// Highest number of jobs listed at the same time.
    pub fn peak_active(&self) -> usize {
        self.state.lock().peak_listed
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().listed.len()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    /// Handles cancelled through [`SchedulerClient::cancel`], in order.
    pub fn cancelled(&self) -> Vec<JobHandle> {
        self.state.lock().cancelled.clone()
    }
}

#[async_trait]
impl SchedulerClient for SimulatedScheduler {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, SubmissionError> {
        if self.rejected_inputs.contains(&request.input_file) {
            return Err(SubmissionError::Rejected {
                message: format!("simulated rejection of {}", request.input_file),
            });
        }

        if let Some(hook) = &self.hook {
            hook(request);
        }

        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = JobHandle::new(format!("{}", 1000 + state.next_id));
        state.listed.insert(handle.clone(), self.polls_until_done);
        state.submissions.push(request.clone());
        state.peak_listed = state.peak_listed.max(state.listed.len());
        debug!(job_id = %handle, input = %request.input_file, "simulated submission");
        Ok(handle)
    }

    async fn is_active(&self, handle: &JobHandle) -> Result<bool, PollingError> {
        let mut state = self.state.lock();
        state.queries += 1;
        let remaining = match state.listed.get_mut(handle) {
            Some(remaining) => remaining,
            None => return Ok(false),
        };
        if *remaining == 0 {
            state.listed.remove(handle);
            Ok(false)
        } else {
            *remaining -= 1;
            Ok(true)
        }
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), PollingError> {
        let mut state = self.state.lock();
        if state.listed.remove(handle).is_some() {
            debug!(job_id = %handle, "simulated cancellation");
            state.cancelled.push(handle.clone());
        }
        Ok(())
    }
}
