//! Job graph construction: validation, cycle detection, matrix fan-out.

use crate::matrix;
use gantry_core::ids::InstanceId;
use gantry_core::interpolation::InterpolationContext;
use gantry_core::run::JobInstance;
use gantry_core::workflow::{JobTemplate, StepSpec, WorkflowDescription};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use thiserror::Error;

/// Configuration errors detected before any job starts.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("workflow has no jobs")]
    EmptyWorkflow,
    #[error("duplicate job name: {0}")]
    DuplicateJob(String),
    #[error("job {job} depends on unknown job {dependency}")]
    UnknownDependency { job: String, dependency: String },
    #[error("dependency cycle involving job {0}")]
    CycleDetected(String),
    #[error("job {job} matrix axis {axis} has no values")]
    EmptyMatrixAxis { job: String, axis: String },
    #[error("job {0} declares no steps and no matrix")]
    EmptyJob(String),
}

/// Expands a workflow description into concrete job instances.
///
/// Dependencies stay at the job-name level: a dependent of a
/// matrix-expanded name implicitly waits on every instance of that name
/// (the executor resolves the conservative join).
pub struct JobGraphBuilder;

impl JobGraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validate the workflow and materialize all job instances.
    pub fn build(&self, workflow: &WorkflowDescription) -> Result<Vec<JobInstance>, GraphError> {
        if workflow.jobs.is_empty() {
            return Err(GraphError::EmptyWorkflow);
        }

        // Name-level dependency graph for validation and cycle detection.
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for job in &workflow.jobs {
            if name_to_index.contains_key(&job.name) {
                return Err(GraphError::DuplicateJob(job.name.clone()));
            }
            let idx = graph.add_node(job.name.clone());
            name_to_index.insert(job.name.clone(), idx);
        }

        for job in &workflow.jobs {
            for dependency in &job.depends_on {
                let dep_idx =
                    name_to_index
                        .get(dependency)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            job: job.name.clone(),
                            dependency: dependency.clone(),
                        })?;
                graph.add_edge(*dep_idx, name_to_index[&job.name], ());
            }
        }

        // Fail fast on cycles instead of deadlocking at schedule time.
        toposort(&graph, None).map_err(|cycle| {
            GraphError::CycleDetected(graph[cycle.node_id()].clone())
        })?;

        let mut instances = Vec::new();
        for job in &workflow.jobs {
            instances.extend(self.expand_job(job)?);
        }
        Ok(instances)
    }

    fn expand_job(&self, job: &JobTemplate) -> Result<Vec<JobInstance>, GraphError> {
        if let Some(matrix) = &job.matrix {
            for (axis, values) in &matrix.axes {
                if values.is_empty() {
                    return Err(GraphError::EmptyMatrixAxis {
                        job: job.name.clone(),
                        axis: axis.clone(),
                    });
                }
            }
        }
        // A job that declares nothing to do is an authoring mistake,
        // not a vacuous success.
        if job.steps.is_empty() && job.matrix.is_none() {
            return Err(GraphError::EmptyJob(job.name.clone()));
        }

        let combinations = matrix::expand(job.matrix.as_ref());
        Ok(combinations
            .into_iter()
            .map(|combination| {
                let ctx = InterpolationContext::with_matrix(combination.clone());
                JobInstance {
                    id: InstanceId::new(),
                    job_name: job.name.clone(),
                    matrix_key: matrix::matrix_key(&combination),
                    display_name: matrix::display_name(&job.name, &combination),
                    runs_on: ctx.interpolate(&job.runs_on),
                    steps: job.steps.iter().map(|s| resolve_step(s, &ctx)).collect(),
                    depends_on: job.depends_on.clone(),
                    timeout_minutes: job.timeout_minutes,
                    matrix: combination,
                }
            })
            .collect())
    }
}

impl Default for JobGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_step(step: &StepSpec, ctx: &InterpolationContext) -> StepSpec {
    StepSpec {
        name: ctx.interpolate(&step.name),
        kind: step.kind,
        params: step
            .params
            .iter()
            .map(|(k, v)| (k.clone(), ctx.interpolate(v)))
            .collect(),
        continue_on_error: step.continue_on_error,
    }
}
