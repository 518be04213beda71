//! Verdict publishing.
//!
//! Reporting is fire-and-forget: invoked once with the complete result
//! set after every reachable job is terminal, and never able to change
//! the run's own verdict.

use async_trait::async_trait;
use gantry_core::Result;
use gantry_core::ports::StatusReporter;
use gantry_core::run::{PipelineRun, PipelineVerdict};
use tracing::{info, warn};

/// Publish the run's verdict through `reporter`, logging (never
/// propagating) publish failures.
pub async fn publish(reporter: &dyn StatusReporter, run: &PipelineRun) {
    if let Err(e) = reporter.publish(run, run.verdict()).await {
        warn!(run = %run.id, error = %e, "failed to publish pipeline verdict");
    }
}

/// Reporter that emits the verdict and per-job detail through `tracing`.
pub struct TracingReporter;

#[async_trait]
impl StatusReporter for TracingReporter {
    async fn publish(&self, run: &PipelineRun, verdict: PipelineVerdict) -> Result<()> {
        info!(run = %run.id, workflow = %run.workflow_name, ?verdict, "pipeline verdict");
        for job in &run.jobs {
            info!(
                job = %job.job_name,
                matrix = job.matrix_key.as_deref().unwrap_or("-"),
                status = ?job.status,
                "job result"
            );
        }
        Ok(())
    }
}
