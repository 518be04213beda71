//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow for a trigger event.
    Run(RunArgs),
    /// Check a workflow description without running anything.
    Validate {
        /// Path to the workflow file.
        workflow: PathBuf,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the workflow file.
    pub workflow: PathBuf,

    /// Event type that triggered this run.
    #[arg(long, value_enum)]
    pub event: EventKind,

    /// Branch the event targets.
    #[arg(long)]
    pub branch: String,

    /// Number of concurrent runner slots.
    #[arg(long, default_value_t = 4)]
    pub runners: usize,

    /// Directory jobs run in (defaults to the current directory).
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Persist the cache under this directory instead of in memory.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventKind {
    #[value(name = "push")]
    Push,
    #[value(name = "pull_request")]
    PullRequest,
}
