use gt_types::{JobHandle, JobState, WorkItem};
use tokio::time::Instant;

/// A submitted unit of execution tracked by the poller.
#[derive(Debug, Clone)]
pub struct Job {
    pub handle: JobHandle,
    pub item: WorkItem,
    pub state: JobState,
    pub submitted_at: Instant,
    /// Set once the scheduler accepted a cancel for this job.
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(handle: JobHandle, item: WorkItem) -> Self {
        Self {
            handle,
            item,
            state: JobState::Submitted,
            submitted_at: Instant::now(),
            cancel_requested: false,
        }
    }
}
