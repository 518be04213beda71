//! Job step execution.
//!
//! Runs the ordered steps of one job instance inside its leased
//! environment. Steps never run concurrently with each other; step N+1
//! may rely on filesystem state left by step N.

use gantry_cache::{CacheStore, archive, derive_key, lockfile_digest, restore_prefix};
use gantry_core::ports::{Environment, ToolchainSpec};
use gantry_core::run::{FailureReason, JobInstance, JobResult, JobStatus, StepOutcome, StepStatus};
use gantry_core::workflow::{StepKind, StepSpec};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes the steps of job instances against a shared cache store.
pub struct JobRunner {
    cache: Arc<dyn CacheStore>,
}

impl JobRunner {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Run all steps of `instance` sequentially inside `environment`.
    ///
    /// After a gating failure, steps without `continue_on_error` are
    /// recorded `Skipped` while the walk continues; steps marked
    /// `continue_on_error` always execute and record their true status
    /// without gating the sequence. The job fails iff a step without
    /// `continue_on_error` failed.
    pub async fn run(&self, instance: &JobInstance, environment: &dyn Environment) -> JobResult {
        let started = std::time::Instant::now();
        let mut steps = Vec::with_capacity(instance.steps.len());
        let mut failed = false;
        // Keys restored with an exact match in this job; their paired
        // save is not required.
        let mut exact_restores: HashSet<String> = HashSet::new();

        info!(job = %instance.display_name, steps = instance.steps.len(), "running job steps");

        for (index, step) in instance.steps.iter().enumerate() {
            if failed && !step.continue_on_error {
                steps.push(StepOutcome {
                    index,
                    name: step.name.clone(),
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                });
                continue;
            }

            let step_started = std::time::Instant::now();
            let status = self.run_step(step, environment, &mut exact_restores).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            debug!(job = %instance.display_name, step = %step.name, ?status, duration_ms, "step finished");

            if status == StepStatus::Failure && !step.continue_on_error {
                failed = true;
            }
            steps.push(StepOutcome {
                index,
                name: step.name.clone(),
                status,
                duration_ms,
            });
        }

        JobResult {
            job_name: instance.job_name.clone(),
            matrix_key: instance.matrix_key.clone(),
            status: if failed {
                JobStatus::Failure
            } else {
                JobStatus::Success
            },
            reason: failed.then_some(FailureReason::Step),
            steps,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn run_step(
        &self,
        step: &StepSpec,
        environment: &dyn Environment,
        exact_restores: &mut HashSet<String>,
    ) -> StepStatus {
        match step.kind {
            StepKind::ShellCommand => self.run_shell(step, environment).await,
            StepKind::ToolchainSetup => self.run_toolchain(step, environment).await,
            StepKind::ExternalAction => self.run_action(step, environment).await,
            StepKind::CacheRestore => self.cache_restore(step, environment, exact_restores).await,
            StepKind::CacheSave => self.cache_save(step, environment, exact_restores).await,
        }
    }

    async fn run_shell(&self, step: &StepSpec, environment: &dyn Environment) -> StepStatus {
        let Some(command) = step.param("command") else {
            warn!(step = %step.name, "shell step has no command");
            return StepStatus::Failure;
        };

        match environment.run_command(command).await {
            Ok(0) => StepStatus::Success,
            Ok(code) => {
                info!(step = %step.name, code, "command exited non-zero");
                StepStatus::Failure
            }
            Err(e) => {
                warn!(step = %step.name, error = %e, "command could not be run");
                StepStatus::Failure
            }
        }
    }

    async fn run_toolchain(&self, step: &StepSpec, environment: &dyn Environment) -> StepStatus {
        let spec = ToolchainSpec {
            toolchain: step.param("toolchain").unwrap_or_default().to_string(),
            version: step.param("version").map(String::from),
            override_default: step.param("override") == Some("true"),
        };

        match environment.install_toolchain(&spec).await {
            Ok(0) => StepStatus::Success,
            Ok(code) => {
                info!(step = %step.name, toolchain = %spec.toolchain, code, "toolchain setup failed");
                StepStatus::Failure
            }
            Err(e) => {
                warn!(step = %step.name, error = %e, "toolchain setup error");
                StepStatus::Failure
            }
        }
    }

    async fn run_action(&self, step: &StepSpec, environment: &dyn Environment) -> StepStatus {
        let Some(action) = step.param("uses") else {
            warn!(step = %step.name, "action step has no `uses` param");
            return StepStatus::Failure;
        };

        match environment.run_action(action, &step.params).await {
            Ok(0) => StepStatus::Success,
            Ok(code) => {
                info!(step = %step.name, action, code, "action exited non-zero");
                StepStatus::Failure
            }
            Err(e) => {
                warn!(step = %step.name, error = %e, "action could not be run");
                StepStatus::Failure
            }
        }
    }

    /// Derive the (key, fallback prefix) pair for a cache step from its
    /// params and the environment's platform + lockfile contents. `None`
    /// degrades the step to a no-op.
    async fn cache_step_key(
        &self,
        step: &StepSpec,
        environment: &dyn Environment,
    ) -> Option<(String, String)> {
        let Some(purpose) = step.param("purpose") else {
            warn!(step = %step.name, "cache step has no purpose, skipping");
            return None;
        };
        let Some(lockfile) = step.param("lockfile") else {
            warn!(step = %step.name, "cache step has no lockfile, skipping");
            return None;
        };

        let lockfile_path = environment.workspace().join(lockfile);
        let contents = match tokio::fs::read(&lockfile_path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(step = %step.name, lockfile, error = %e, "lockfile unreadable, skipping cache step");
                return None;
            }
        };

        let os = environment.platform();
        let key = derive_key(os, purpose, &lockfile_digest(&contents));
        Some((key, restore_prefix(os, purpose)))
    }

    /// Cache steps never fail the owning job: every error path degrades
    /// to a miss or a skipped write.
    async fn cache_restore(
        &self,
        step: &StepSpec,
        environment: &dyn Environment,
        exact_restores: &mut HashSet<String>,
    ) -> StepStatus {
        let Some((key, prefix)) = self.cache_step_key(step, environment).await else {
            return StepStatus::Success;
        };

        match self.cache.restore(&key, &prefix).await {
            Ok(outcome) => {
                if let Some(entry) = outcome.entry {
                    info!(
                        key,
                        matched = %entry.key,
                        exact = outcome.exact,
                        size_bytes = entry.size_bytes,
                        "cache hit"
                    );
                    if outcome.exact {
                        exact_restores.insert(key);
                    }
                    self.unpack_payload(entry.payload, environment).await;
                } else {
                    info!(key, "cache miss");
                }
            }
            Err(e) => {
                warn!(key, error = %e, "cache restore failed, continuing without cache");
            }
        }
        StepStatus::Success
    }

    async fn cache_save(
        &self,
        step: &StepSpec,
        environment: &dyn Environment,
        exact_restores: &mut HashSet<String>,
    ) -> StepStatus {
        let Some((key, _)) = self.cache_step_key(step, environment).await else {
            return StepStatus::Success;
        };

        if exact_restores.contains(&key) {
            debug!(key, "exact restore earlier in job, save not required");
            return StepStatus::Success;
        }

        let paths: Vec<String> = step
            .param("paths")
            .map(|p| p.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let workspace = environment.workspace().to_path_buf();
        let pack_paths = paths.clone();
        let payload =
            match tokio::task::spawn_blocking(move || archive::pack(&workspace, &pack_paths)).await
            {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    warn!(key, error = %e, "failed to pack cache payload, skipping save");
                    return StepStatus::Success;
                }
                Err(e) => {
                    warn!(key, error = %e, "cache packing task failed, skipping save");
                    return StepStatus::Success;
                }
            };

        match self.cache.save(&key, &paths, payload).await {
            Ok(outcome) if !outcome.stored => {
                debug!(key, "entry already present, save skipped");
            }
            Ok(_) => {
                info!(key, "cache saved");
            }
            Err(e) => {
                warn!(key, error = %e, "cache save failed, continuing");
            }
        }
        StepStatus::Success
    }

    async fn unpack_payload(&self, payload: Vec<u8>, environment: &dyn Environment) {
        let workspace = environment.workspace().to_path_buf();
        match tokio::task::spawn_blocking(move || archive::unpack(&payload, &workspace)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to unpack cache payload"),
            Err(e) => warn!(error = %e, "cache unpacking task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_cache::MemoryStore;
    use gantry_core::Result;
    use gantry_core::ids::InstanceId;
    use std::collections::{BTreeMap, HashMap};
    use std::path::{Path, PathBuf};

    /// Environment that scripts exit codes per command.
    struct FakeEnvironment {
        workspace: PathBuf,
        exit_codes: HashMap<String, i32>,
    }

    impl FakeEnvironment {
        fn new(workspace: PathBuf) -> Self {
            Self {
                workspace,
                exit_codes: HashMap::new(),
            }
        }

        fn failing(mut self, command: &str, code: i32) -> Self {
            self.exit_codes.insert(command.to_string(), code);
            self
        }
    }

    #[async_trait]
    impl Environment for FakeEnvironment {
        fn platform(&self) -> &str {
            "linux"
        }

        fn workspace(&self) -> &Path {
            &self.workspace
        }

        async fn run_command(&self, command: &str) -> Result<i32> {
            Ok(self.exit_codes.get(command).copied().unwrap_or(0))
        }

        async fn install_toolchain(&self, _spec: &ToolchainSpec) -> Result<i32> {
            Ok(0)
        }

        async fn run_action(&self, action: &str, _params: &HashMap<String, String>) -> Result<i32> {
            Ok(self.exit_codes.get(action).copied().unwrap_or(0))
        }
    }

    fn shell_step(name: &str, command: &str, continue_on_error: bool) -> StepSpec {
        let mut params = HashMap::new();
        params.insert("command".to_string(), command.to_string());
        StepSpec {
            name: name.to_string(),
            kind: StepKind::ShellCommand,
            params,
            continue_on_error,
        }
    }

    fn cache_step(kind: StepKind, purpose: &str, lockfile: &str, paths: &str) -> StepSpec {
        let mut params = HashMap::new();
        params.insert("purpose".to_string(), purpose.to_string());
        params.insert("lockfile".to_string(), lockfile.to_string());
        params.insert("paths".to_string(), paths.to_string());
        StepSpec {
            name: format!("{:?}", kind),
            kind,
            params,
            continue_on_error: false,
        }
    }

    fn instance(steps: Vec<StepSpec>) -> JobInstance {
        JobInstance {
            id: InstanceId::new(),
            job_name: "test".to_string(),
            matrix: BTreeMap::new(),
            matrix_key: None,
            display_name: "test".to_string(),
            runs_on: "linux".to_string(),
            steps,
            depends_on: vec![],
            timeout_minutes: None,
        }
    }

    fn runner() -> JobRunner {
        JobRunner::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf());
        let result = runner()
            .run(
                &instance(vec![
                    shell_step("fmt", "cargo fmt --check", false),
                    shell_step("clippy", "cargo clippy", false),
                ]),
                &env,
            )
            .await;

        assert_eq!(result.status, JobStatus::Success);
        assert!(result.reason.is_none());
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Success));
    }

    #[tokio::test]
    async fn test_failure_skips_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf()).failing("cargo build", 101);
        let result = runner()
            .run(
                &instance(vec![
                    shell_step("build", "cargo build", false),
                    shell_step("test", "cargo test", false),
                    shell_step("doc", "cargo doc", false),
                ]),
                &env,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.reason, Some(FailureReason::Step));
        assert_eq!(result.steps[0].status, StepStatus::Failure);
        assert_eq!(result.steps[1].status, StepStatus::Skipped);
        assert_eq!(result.steps[2].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_continue_on_error_still_runs_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf())
            .failing("cargo build", 1)
            .failing("upload coverage", 2);
        let result = runner()
            .run(
                &instance(vec![
                    shell_step("build", "cargo build", false),
                    shell_step("coverage", "upload coverage", true),
                    shell_step("test", "cargo test", false),
                ]),
                &env,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failure);
        // The tolerated step ran and recorded its true status.
        assert_eq!(result.steps[1].status, StepStatus::Failure);
        assert_eq!(result.steps[2].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_continue_on_error_failure_does_not_fail_job() {
        let dir = tempfile::tempdir().unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf()).failing("upload coverage", 2);
        let result = runner()
            .run(
                &instance(vec![
                    shell_step("coverage", "upload coverage", true),
                    shell_step("test", "cargo test", false),
                ]),
                &env,
            )
            .await;

        assert_eq!(result.status, JobStatus::Success);
        assert_eq!(result.steps[0].status, StepStatus::Failure);
        assert_eq!(result.steps[1].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn test_cache_miss_never_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), b"lock v1").unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf());

        let result = runner()
            .run(
                &instance(vec![cache_step(
                    StepKind::CacheRestore,
                    "cargo",
                    "Cargo.lock",
                    "target",
                )]),
                &env,
            )
            .await;

        assert_eq!(result.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_save_then_exact_restore() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), b"lock v1").unwrap();
        std::fs::write(dir.path().join("artifact"), b"bits").unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf());
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::new(store.clone());

        runner
            .run(
                &instance(vec![cache_step(
                    StepKind::CacheSave,
                    "cargo",
                    "Cargo.lock",
                    "artifact",
                )]),
                &env,
            )
            .await;

        let key = derive_key("linux", "cargo", &lockfile_digest(b"lock v1"));
        assert!(store.exists(&key).await.unwrap());

        let outcome = store
            .restore(&key, &restore_prefix("linux", "cargo"))
            .await
            .unwrap();
        assert!(outcome.exact);
    }

    #[tokio::test]
    async fn test_exact_restore_elides_save() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.lock"), b"lock v1").unwrap();
        let env = FakeEnvironment::new(dir.path().to_path_buf());
        let store = Arc::new(MemoryStore::new());

        let key = derive_key("linux", "cargo", &lockfile_digest(b"lock v1"));
        store
            .save(&key, &[], archive::pack(dir.path(), &[]).unwrap())
            .await
            .unwrap();
        let original = store
            .restore(&key, "")
            .await
            .unwrap()
            .entry
            .unwrap()
            .payload;

        let runner = JobRunner::new(store.clone());
        runner
            .run(
                &instance(vec![
                    cache_step(StepKind::CacheRestore, "cargo", "Cargo.lock", "artifact"),
                    cache_step(StepKind::CacheSave, "cargo", "Cargo.lock", "artifact"),
                ]),
                &env,
            )
            .await;

        let entry = store.restore(&key, "").await.unwrap().entry.unwrap();
        assert_eq!(entry.payload, original);
    }
}
