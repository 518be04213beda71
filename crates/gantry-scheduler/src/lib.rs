//! Workflow scheduling and execution for Gantry.

pub mod dag;
pub mod executor;
pub mod matrix;
pub mod report;
pub mod triggers;

pub use dag::{GraphError, JobGraphBuilder};
pub use executor::{CancelHandle, Executor};
pub use triggers::{TriggerEvent, should_run};
