//! Batch scheduler plumbing for gaptune.
//!
//! Provides:
//! - A thin gateway to the external scheduler (submit / query commands)
//! - Completion polling with deadlines and cancellation
//! - Bounded-concurrency batch submission
//! - An in-process simulated scheduler for tests and dry runs

pub mod client;
pub mod job;
pub mod poller;
pub mod simulated;
pub mod submitter;

pub use client::{SchedulerClient, SchedulerConfig, SlurmClient, SubmitRequest};
pub use job::Job;
pub use poller::{CompletionPoller, PollConfig, WaitError, WaitSet};
pub use simulated::SimulatedScheduler;
pub use submitter::{BatchOutcome, BatchSubmitter, FailedSubmission};
