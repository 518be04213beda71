//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the engine core and
//! external adapters: the runner infrastructure that supplies isolated
//! execution environments, and the reporting integrations that receive
//! the final verdict.

use crate::Result;
use crate::run::{PipelineRun, PipelineVerdict};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Toolchain installation request, forwarded opaquely to the installer.
#[derive(Debug, Clone)]
pub struct ToolchainSpec {
    pub toolchain: String,
    pub version: Option<String>,
    pub override_default: bool,
}

/// An isolated execution environment leased from a [`RunnerProvider`].
///
/// The engine never assumes anything about the environment beyond its
/// platform tag, its workspace directory, and the exit codes of the
/// invocations it dispatches.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Platform tag this environment satisfies.
    fn platform(&self) -> &str;

    /// Job-local working directory.
    fn workspace(&self) -> &Path;

    /// Run a shell command line, returning its exit code.
    async fn run_command(&self, command: &str) -> Result<i32>;

    /// Install a toolchain, returning the installer's exit code.
    async fn install_toolchain(&self, spec: &ToolchainSpec) -> Result<i32>;

    /// Invoke an external action, returning its exit code.
    async fn run_action(&self, action: &str, params: &HashMap<String, String>) -> Result<i32>;
}

/// Supplier of isolated execution environments.
#[async_trait]
pub trait RunnerProvider: Send + Sync {
    /// Lease an environment matching the platform tag. Blocks while all
    /// slots are busy; waiters are served in FIFO order.
    async fn acquire(&self, platform: &str) -> Result<Box<dyn Environment>>;

    /// Return a leased environment to the pool.
    async fn release(&self, environment: Box<dyn Environment>);
}

/// Outbound status reporting (commit checks, notifications).
///
/// Called once per run with the complete result set; publish failures
/// must never alter the run's own verdict.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn publish(&self, run: &PipelineRun, verdict: PipelineVerdict) -> Result<()>;
}
