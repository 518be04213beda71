//! Concurrent job dispatch over a bounded runner pool.

use crate::report;
use gantry_core::ids::{InstanceId, RunId};
use gantry_core::ports::{RunnerProvider, StatusReporter};
use gantry_core::run::{JobInstance, JobResult, JobStatus, PipelineRun};
use gantry_runner::JobRunner;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;
use tokio::time::{Duration, timeout};
use tracing::{info, warn};

/// Handle for cancelling an in-flight pipeline run.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the run: every non-terminal job becomes `Cancelled` and
    /// in-flight steps are interrupted.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Dispatches job instances to runner slots and collects results.
///
/// State machine per instance: `Pending → Ready → Running → terminal`.
/// Ready instances queue FIFO on the provider's capacity. No ordering
/// exists among jobs without a dependency edge; callers must only rely
/// on the final [`PipelineRun`].
pub struct Executor {
    provider: Arc<dyn RunnerProvider>,
    runner: Arc<JobRunner>,
    reporter: Option<Arc<dyn StatusReporter>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl Executor {
    pub fn new(provider: Arc<dyn RunnerProvider>, runner: JobRunner) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            provider,
            runner: Arc::new(runner),
            reporter: None,
            cancel: Arc::new(tx),
        }
    }

    /// Publish the verdict through `reporter` once the run completes.
    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel.clone(),
        }
    }

    /// Execute all instances, respecting dependency edges and slot
    /// capacity, and return the completed run.
    pub async fn execute(&self, workflow_name: &str, instances: Vec<JobInstance>) -> PipelineRun {
        let run_id = RunId::new();
        let started_at = chrono::Utc::now();
        info!(run = %run_id, workflow = workflow_name, jobs = instances.len(), "starting pipeline run");

        let order: Vec<InstanceId> = instances.iter().map(|i| i.id).collect();
        let mut by_name: HashMap<String, Vec<InstanceId>> = HashMap::new();
        for instance in &instances {
            by_name
                .entry(instance.job_name.clone())
                .or_default()
                .push(instance.id);
        }
        let index: HashMap<InstanceId, JobInstance> =
            instances.into_iter().map(|i| (i.id, i)).collect();

        let states: Arc<RwLock<HashMap<InstanceId, JobStatus>>> = Arc::new(RwLock::new(
            order.iter().map(|id| (*id, JobStatus::Pending)).collect(),
        ));
        let mut results: HashMap<InstanceId, JobResult> = HashMap::new();
        let mut join_set: JoinSet<(InstanceId, JobResult)> = JoinSet::new();
        let mut cancel_rx = self.cancel.subscribe();

        loop {
            // Propagate non-success terminals to dependents, then
            // dispatch everything whose dependencies all succeeded.
            {
                let mut st = states.write().await;

                loop {
                    let mut changed = false;
                    for id in &order {
                        if st[id] != JobStatus::Pending {
                            continue;
                        }
                        let blocked = dependency_ids(&index[id], &by_name).into_iter().any(|dep| {
                            let status = st[&dep];
                            status.is_terminal() && status != JobStatus::Success
                        });
                        if blocked {
                            st.insert(*id, JobStatus::Skipped);
                            results.insert(*id, JobResult::skipped(&index[id]));
                            info!(job = %index[id].display_name, "skipped: dependency did not succeed");
                            changed = true;
                        }
                    }
                    if !changed {
                        break;
                    }
                }

                for id in &order {
                    if st[id] != JobStatus::Pending {
                        continue;
                    }
                    let ready = dependency_ids(&index[id], &by_name)
                        .into_iter()
                        .all(|dep| st[&dep] == JobStatus::Success);
                    if ready {
                        st.insert(*id, JobStatus::Ready);
                        join_set.spawn(run_instance(
                            self.provider.clone(),
                            self.runner.clone(),
                            states.clone(),
                            index[id].clone(),
                        ));
                    }
                }
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_ok() && *cancel_rx.borrow() {
                        warn!(run = %run_id, "pipeline run cancelled");
                        join_set.abort_all();
                        // Keep results from tasks that finished before
                        // the abort landed.
                        while let Some(joined) = join_set.join_next().await {
                            if let Ok((id, result)) = joined {
                                states.write().await.insert(id, result.status);
                                results.insert(id, result);
                            }
                        }
                        break;
                    }
                }
                Some(joined) = join_set.join_next() => {
                    match joined {
                        Ok((id, result)) => {
                            states.write().await.insert(id, result.status);
                            info!(job = %index[&id].display_name, status = ?result.status, "job finished");
                            results.insert(id, result);
                        }
                        Err(e) => {
                            warn!(error = %e, "job task aborted");
                        }
                    }
                }
            }
        }

        // Anything still non-terminal was cancelled.
        {
            let mut st = states.write().await;
            for id in &order {
                if !st[id].is_terminal() {
                    st.insert(*id, JobStatus::Cancelled);
                    results.insert(*id, JobResult::cancelled(&index[id]));
                }
            }
        }

        let run = PipelineRun {
            id: run_id,
            workflow_name: workflow_name.to_string(),
            jobs: order.iter().filter_map(|id| results.remove(id)).collect(),
            started_at,
            completed_at: Some(chrono::Utc::now()),
        };

        info!(run = %run_id, verdict = ?run.verdict(), "pipeline run complete");

        if let Some(reporter) = &self.reporter {
            report::publish(reporter.as_ref(), &run).await;
        }

        run
    }
}

/// All instance-level dependencies of `instance`: every instance of
/// every depended-on name (the conservative join over matrix fan-outs).
fn dependency_ids(
    instance: &JobInstance,
    by_name: &HashMap<String, Vec<InstanceId>>,
) -> Vec<InstanceId> {
    instance
        .depends_on
        .iter()
        .flat_map(|name| by_name.get(name).cloned().unwrap_or_default())
        .collect()
}

async fn run_instance(
    provider: Arc<dyn RunnerProvider>,
    runner: Arc<JobRunner>,
    states: Arc<RwLock<HashMap<InstanceId, JobStatus>>>,
    instance: JobInstance,
) -> (InstanceId, JobResult) {
    let environment = match provider.acquire(&instance.runs_on).await {
        Ok(environment) => environment,
        Err(e) => {
            warn!(job = %instance.display_name, error = %e, "provider could not supply an environment");
            return (instance.id, JobResult::provider_failure(&instance));
        }
    };

    states.write().await.insert(instance.id, JobStatus::Running);
    info!(job = %instance.display_name, platform = %instance.runs_on, "job running");

    let started = std::time::Instant::now();
    let result = match instance.timeout_minutes {
        Some(minutes) => {
            let budget = Duration::from_secs(minutes * 60);
            match timeout(budget, runner.run(&instance, environment.as_ref())).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(job = %instance.display_name, minutes, "job exceeded its wall-clock budget");
                    JobResult::timed_out(&instance, started.elapsed().as_millis() as u64)
                }
            }
        }
        None => runner.run(&instance, environment.as_ref()).await,
    };

    provider.release(environment).await;
    (instance.id, result)
}
