//! Local host runner provider.
//!
//! The reference [`RunnerProvider`] adapter: serves a bounded number of
//! slots on the local machine and runs shell steps through `sh -c`.
//! All slots share the provider's workspace directory; filesystem
//! isolation between jobs is a hosted provider's concern.

use crate::actions::{ActionRegistry, TOOLCHAIN_ACTION};
use async_trait::async_trait;
use gantry_core::ports::{Environment, RunnerProvider, ToolchainSpec};
use gantry_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

pub struct LocalProvider {
    slots: Arc<Semaphore>,
    workspace: PathBuf,
    actions: Arc<ActionRegistry>,
}

impl LocalProvider {
    /// Provider with `capacity` concurrent slots rooted at `workspace`.
    pub fn new(capacity: usize, workspace: PathBuf) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            workspace,
            actions: Arc::new(ActionRegistry::new()),
        }
    }

    /// Attach local handlers for external actions and toolchain setup.
    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Arc::new(actions);
        self
    }
}

#[async_trait]
impl RunnerProvider for LocalProvider {
    async fn acquire(&self, platform: &str) -> Result<Box<dyn Environment>> {
        // Semaphore waiters are FIFO, which gives queued jobs their
        // dispatch order when all slots are busy.
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Provider("runner slot pool is closed".to_string()))?;

        tokio::fs::create_dir_all(&self.workspace).await?;
        debug!(platform, "local runner slot acquired");

        Ok(Box::new(LocalEnvironment {
            platform: platform.to_string(),
            workspace: self.workspace.clone(),
            actions: self.actions.clone(),
            _permit: permit,
        }))
    }

    async fn release(&self, environment: Box<dyn Environment>) {
        // Dropping the environment returns its permit to the pool.
        drop(environment);
    }
}

pub struct LocalEnvironment {
    platform: String,
    workspace: PathBuf,
    actions: Arc<ActionRegistry>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    async fn run_command(&self, command: &str) -> Result<i32> {
        info!(command, workspace = %self.workspace.display(), "executing shell command");

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Provider(format!("failed to spawn process: {}", e)))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn install_toolchain(&self, spec: &ToolchainSpec) -> Result<i32> {
        let mut params = HashMap::new();
        params.insert("toolchain".to_string(), spec.toolchain.clone());
        if let Some(version) = &spec.version {
            params.insert("version".to_string(), version.clone());
        }
        params.insert("override".to_string(), spec.override_default.to_string());

        Ok(self.actions.dispatch(TOOLCHAIN_ACTION, &params))
    }

    async fn run_action(&self, action: &str, params: &HashMap<String, String>) -> Result<i32> {
        Ok(self.actions.dispatch(action, params))
    }
}
