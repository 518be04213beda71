//! Run and execution types.

use crate::ids::{InstanceId, RunId};
use crate::workflow::StepSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete, schedulable unit derived from a job template and one
/// matrix combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: InstanceId,
    pub job_name: String,
    /// Matrix values this instance was expanded with; empty when the
    /// template has no matrix.
    pub matrix: BTreeMap<String, String>,
    /// Short combination key, e.g. `os=linux`.
    pub matrix_key: Option<String>,
    /// Human-readable name, e.g. `test (os=linux)`.
    pub display_name: String,
    /// Resolved platform tag.
    pub runs_on: String,
    /// Steps with matrix values substituted into parameters.
    pub steps: Vec<StepSpec>,
    /// Job NAMES this instance waits on; a name with a matrix implies
    /// all of its instances.
    pub depends_on: Vec<String>,
    pub timeout_minutes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Ready,
    Running,
    Success,
    Failure,
    Skipped,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Skipped | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Why a job ended in `Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Step,
    Timeout,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_name: String,
    pub matrix_key: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub reason: Option<FailureReason>,
    pub steps: Vec<StepOutcome>,
    pub duration_ms: u64,
}

impl JobResult {
    fn terminal(instance: &JobInstance, status: JobStatus, reason: Option<FailureReason>) -> Self {
        Self {
            job_name: instance.job_name.clone(),
            matrix_key: instance.matrix_key.clone(),
            status,
            reason,
            steps: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Result for an instance whose dependency finished without success.
    pub fn skipped(instance: &JobInstance) -> Self {
        Self::terminal(instance, JobStatus::Skipped, None)
    }

    /// Result for an instance interrupted by run cancellation.
    pub fn cancelled(instance: &JobInstance) -> Self {
        Self::terminal(instance, JobStatus::Cancelled, None)
    }

    /// Result for an instance the provider could not serve.
    pub fn provider_failure(instance: &JobInstance) -> Self {
        Self::terminal(instance, JobStatus::Failure, Some(FailureReason::Provider))
    }

    /// Result for an instance that exceeded its wall-clock budget.
    pub fn timed_out(instance: &JobInstance, duration_ms: u64) -> Self {
        let mut result = Self::terminal(instance, JobStatus::Failure, Some(FailureReason::Timeout));
        result.duration_ms = duration_ms;
        result
    }
}

/// All job results for one triggering event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub workflow_name: String,
    pub jobs: Vec<JobResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Failure iff at least one job reports `Failure`; `Skipped` and
    /// `Cancelled` never cause a pipeline failure by themselves.
    pub fn verdict(&self) -> PipelineVerdict {
        if self.jobs.iter().any(|j| j.status == JobStatus::Failure) {
            PipelineVerdict::Failure
        } else {
            PipelineVerdict::Success
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVerdict {
    Success,
    Failure,
}
