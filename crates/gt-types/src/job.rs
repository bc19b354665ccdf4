use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier returned by the batch scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a submitted job as observed through the scheduler.
///
/// `Completed` only means the handle left the scheduler's active list; the
/// artifact's completion marker is what confirms the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Active,
    Completed,
    /// The wait was abandoned before the handle was seen to leave the queue.
    Unknown,
    /// The handle stayed active past the configured job deadline.
    TimedOut,
}

impl JobState {
    /// Whether the poller no longer waits on a job in this state.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Unknown | Self::TimedOut)
    }
}
