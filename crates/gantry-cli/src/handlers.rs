//! Command handlers.

use crate::commands::{EventKind, RunArgs};
use anyhow::Context;
use console::style;
use gantry_cache::{CacheStore, FilesystemStore, MemoryStore};
use gantry_core::run::{FailureReason, JobStatus, PipelineRun, PipelineVerdict, StepStatus};
use gantry_core::workflow::WorkflowDescription;
use gantry_runner::{JobRunner, LocalProvider};
use gantry_scheduler::executor::Executor;
use gantry_scheduler::report::TracingReporter;
use gantry_scheduler::triggers::TriggerEvent;
use gantry_scheduler::{JobGraphBuilder, should_run};
use std::path::Path;
use std::sync::Arc;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;

pub async fn run(args: RunArgs) -> i32 {
    let workflow = match load_workflow(&args.workflow) {
        Ok(workflow) => workflow,
        Err(e) => return config_error(e),
    };

    let event = match args.event {
        EventKind::Push => TriggerEvent::Push {
            branch: args.branch.clone(),
        },
        EventKind::PullRequest => TriggerEvent::PullRequest {
            target_branch: args.branch.clone(),
        },
    };

    if !should_run(&event, &workflow) {
        println!(
            "{} no trigger in {} matches this event; nothing to run",
            style("-").dim(),
            style(&workflow.name).bold()
        );
        return EXIT_SUCCESS;
    }

    let instances = match JobGraphBuilder::new().build(&workflow) {
        Ok(instances) => instances,
        Err(e) => return config_error(e.into()),
    };

    println!(
        "\n{} Running workflow: {} ({} job instances)",
        style(">").cyan().bold(),
        style(&workflow.name).bold(),
        instances.len()
    );

    let workspace = args
        .workspace
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf()));
    let cache: Arc<dyn CacheStore> = match args.cache_dir {
        Some(dir) => Arc::new(FilesystemStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };
    let provider = Arc::new(LocalProvider::new(args.runners.max(1), workspace));

    let executor =
        Executor::new(provider, JobRunner::new(cache)).with_reporter(Arc::new(TracingReporter));
    let run = executor.execute(&workflow.name, instances).await;

    print_summary(&run);

    match run.verdict() {
        PipelineVerdict::Success => EXIT_SUCCESS,
        PipelineVerdict::Failure => EXIT_FAILURE,
    }
}

pub fn validate(path: &Path) -> i32 {
    let workflow = match load_workflow(path) {
        Ok(workflow) => workflow,
        Err(e) => return config_error(e),
    };

    match JobGraphBuilder::new().build(&workflow) {
        Ok(instances) => {
            println!(
                "{} {} is valid ({} job instances)",
                style("ok").green().bold(),
                path.display(),
                instances.len()
            );
            EXIT_SUCCESS
        }
        Err(e) => config_error(e.into()),
    }
}

fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDescription> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;
    let workflow: WorkflowDescription = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid workflow description in {}", path.display()))?;
    Ok(workflow)
}

fn config_error(e: anyhow::Error) -> i32 {
    eprintln!("{} {:#}", style("configuration error:").red().bold(), e);
    EXIT_CONFIG
}

fn print_summary(run: &PipelineRun) {
    println!();
    for job in &run.jobs {
        let name = match &job.matrix_key {
            Some(key) => format!("{} ({})", job.job_name, key),
            None => job.job_name.clone(),
        };
        let mark = match job.status {
            JobStatus::Success => style("pass").green(),
            JobStatus::Failure => style("fail").red(),
            JobStatus::Skipped => style("skip").yellow(),
            JobStatus::Cancelled => style("stop").yellow(),
            _ => style("????").dim(),
        };
        let reason = match job.reason {
            Some(FailureReason::Timeout) => " (timeout)",
            Some(FailureReason::Provider) => " (no runner)",
            _ => "",
        };
        println!("  {}  {}{}", mark, style(&name).bold(), reason);

        for step in &job.steps {
            let step_mark = match step.status {
                StepStatus::Success => style("+").green(),
                StepStatus::Failure => style("x").red(),
                StepStatus::Skipped => style("-").dim(),
            };
            println!(
                "       {} {} ({:.2}s)",
                step_mark,
                step.name,
                step.duration_ms as f64 / 1000.0
            );
        }
    }

    println!();
    match run.verdict() {
        PipelineVerdict::Success => println!(
            "{} Pipeline succeeded",
            style("ok").green().bold()
        ),
        PipelineVerdict::Failure => println!(
            "{} Pipeline failed",
            style("error").red().bold()
        ),
    }
}
