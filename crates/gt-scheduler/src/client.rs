//! Gateway to the external batch scheduler.

use async_trait::async_trait;
use gt_types::{JobHandle, PollingError, SubmissionError, WorkItem};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Everything the scheduler needs to start one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Directory the submission command runs in. The job writes its log here.
    pub working_dir: PathBuf,
    /// Input file name relative to `working_dir`.
    pub input_file: String,
}

impl SubmitRequest {
    pub fn for_item(item: &WorkItem, root: &Path) -> Self {
        Self {
            working_dir: item.job_dir(root),
            input_file: item.input_file_name(),
        }
    }
}

/// Core scheduler interface.
///
/// Implementations are stateless from the caller's point of view: no retries
/// and no interpretation beyond "a handle came back" and "the handle is still
/// listed".
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Submit a job. Returns the scheduler-assigned handle.
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, SubmissionError>;

    /// Whether the handle still appears in the scheduler's active queue.
    async fn is_active(&self, handle: &JobHandle) -> Result<bool, PollingError>;

    /// Ask the scheduler to kill a job. The job may stay listed for a while
    /// after this returns; callers keep polling until it is gone.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), PollingError>;
}

/// Command templates for a SLURM-style scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Submission argv. `{input}` is replaced by the input file name.
    pub submit_command: Vec<String>,
    /// Status argv. `{job_id}` is replaced by the job handle.
    pub query_command: Vec<String>,
    /// Cancellation argv for overdue jobs. `{job_id}` is replaced by the job handle.
    pub cancel_command: Vec<String>,
    /// Output fragments meaning the scheduler no longer knows the job.
    pub gone_markers: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_command: ["gms_sbatch", "-p", "r630", "-c", "30", "-i", "{input}"]
                .into_iter()
                .map(String::from)
                .collect(),
            query_command: ["squeue", "-j", "{job_id}"]
                .into_iter()
                .map(String::from)
                .collect(),
            cancel_command: ["scancel", "{job_id}"]
                .into_iter()
                .map(String::from)
                .collect(),
            gone_markers: vec!["Invalid job id".to_string()],
        }
    }
}

/// Scheduler client that shells out to the configured commands.
#[derive(Debug, Clone)]
pub struct SlurmClient {
    config: SchedulerConfig,
}

impl SlurmClient {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn is_gone(&self, stdout: &str, stderr: &str) -> bool {
        self.config
            .gone_markers
            .iter()
            .any(|m| stdout.contains(m.as_str()) || stderr.contains(m.as_str()))
    }
}

#[async_trait]
impl SchedulerClient for SlurmClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, SubmissionError> {
        let (program, args) = render(&self.config.submit_command, "{input}", &request.input_file);
        debug!(program = %program, dir = %request.working_dir.display(), "running submission command");

        let output = Command::new(&program)
            .args(&args)
            .current_dir(&request.working_dir)
            .output()
            .await
            .map_err(|e| SubmissionError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SubmissionError::CommandFailed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_job_id(&stdout).ok_or_else(|| SubmissionError::UnparsableHandle {
            output: stdout.trim().to_string(),
        })
    }

    async fn is_active(&self, handle: &JobHandle) -> Result<bool, PollingError> {
        let (program, args) = render(&self.config.query_command, "{job_id}", handle.as_str());

        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PollingError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return Ok(lists_job(&stdout, handle));
        }

        // squeue exits non-zero once a finished job has been purged.
        if self.is_gone(&stdout, &stderr) {
            return Ok(false);
        }

        Err(PollingError::CommandFailed {
            status: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), PollingError> {
        let (program, args) = render(&self.config.cancel_command, "{job_id}", handle.as_str());
        debug!(program = %program, job_id = %handle, "running cancel command");

        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PollingError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || self.is_gone(&stdout, &stderr) {
            return Ok(());
        }

        Err(PollingError::CommandFailed {
            status: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Split an argv template into program and arguments, substituting `key`.
fn render(template: &[String], key: &str, value: &str) -> (String, Vec<String>) {
    let mut parts = template.iter().map(|part| part.replace(key, value));
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

/// Take the last token of the last non-empty line, so both a bare id and
/// `Submitted batch job 123` work. `123;cluster` (parsable output) keeps `123`.
fn parse_job_id(stdout: &str) -> Option<JobHandle> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let token = line.split_whitespace().last()?;
    let id = token.split(';').next().unwrap_or(token);
    if id.is_empty() || !id.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(JobHandle::new(id))
}

/// Token match rather than substring so job 12 is not mistaken for job 123.
fn lists_job(stdout: &str, handle: &JobHandle) -> bool {
    stdout.split_whitespace().any(|token| token == handle.as_str())
}
