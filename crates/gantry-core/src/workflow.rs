//! Workflow description types.
//!
//! These types represent the user-authored workflow configuration:
//! trigger rules plus an ordered list of job templates. Parsing the
//! on-disk representation is the caller's concern; the types here
//! deserialize directly via serde.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDescription {
    pub name: String,
    #[serde(default, rename = "on")]
    pub triggers: Vec<TriggerRule>,
    pub jobs: Vec<JobTemplate>,
}

/// A rule matches an event iff the event type matches and the target
/// branch matches at least one pattern. No patterns means any branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub event: EventType,
    #[serde(default)]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Push,
    PullRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,
    /// Platform tag the job needs from the runner provider. May contain
    /// `${{ matrix.* }}` placeholders.
    pub runs_on: String,
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Names of jobs that must succeed before this one runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Wall-clock budget; exceeding it fails the job with a timeout
    /// reason.
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

/// Matrix axes whose cross-product fans a job template out into one
/// instance per combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub axes: BTreeMap<String, Vec<String>>,
}

/// One action within a job.
///
/// Recognized params per kind:
/// - `toolchain_setup`: `toolchain`, `version`, `override`
/// - `cache_restore` / `cache_save`: `purpose`, `lockfile`, `paths`
///   (whitespace-separated)
/// - `external_action`: `uses` plus arbitrary action parameters
/// - `shell_command`: `command`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub kind: StepKind,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl StepSpec {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ToolchainSetup,
    CacheRestore,
    CacheSave,
    ExternalAction,
    ShellCommand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_snake_case() {
        let kind: StepKind = serde_json::from_str("\"shell_command\"").unwrap();
        assert_eq!(kind, StepKind::ShellCommand);
        let kind: StepKind = serde_json::from_str("\"cache_restore\"").unwrap();
        assert_eq!(kind, StepKind::CacheRestore);
    }

    #[test]
    fn test_event_type_snake_case() {
        let event: EventType = serde_json::from_str("\"pull_request\"").unwrap();
        assert_eq!(event, EventType::PullRequest);
    }
}
