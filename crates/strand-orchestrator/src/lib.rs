//! Strand Orchestrator
//!
//! Turns a locked workflow into tasks for a [`LocalEngine`], discovering the
//! graph as it goes. An [`OrchestratorJob`](scheduler::OrchestratorJob)
//! schedules a workflow's steps when it runs: each step whose sources are
//! known becomes one or more tasks, and its outputs become promises that
//! later steps read from.
//!
//! # Task shapes
//!
//! - Leaf tool with literal resources: one leaf task.
//! - Leaf tool with expression resources: a deferred task that sizes and
//!   spawns the leaf once its inputs are known.
//! - Scattered step: a scatter task (one child per element) with a gather
//!   follow-on.
//! - Nested workflow: an orchestrator with a resolve follow-on.
//!
//! # Usage
//!
//! ```ignore
//! let caps = Capabilities::new(executor, evaluator, executor_config);
//! let engine = LocalEngine::new(EngineConfig::default());
//! let outputs = run_workflow(&engine, &executable, job_order, &caps, cancel).await?;
//! ```

mod capabilities;
mod construct;
mod error;
mod pending;
mod promise;
mod resolve_job;
mod scatter;
mod scheduler;
mod staging;
#[cfg(test)]
mod test_support;

use serde_json::{Map, Value};
use strand_engine::{ExecutionNotifier, JobContext, LocalEngine, TaskGraph, TaskId};
use strand_workflow::Executable;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use capabilities::Capabilities;
pub use construct::{Construction, DeferredJob, LeafJob, deferred_resources, make_task};
pub use error::OrchestratorError;
pub use pending::{DeferredExpression, LinkMerge, MergeSpec, PendingInput, PendingValue};
pub use promise::{Producer, Promise, PromiseMap};
pub use resolve_job::ResolveIndirectJob;
pub use scatter::{GatherJob, ScatterJob, ScatterMethod};
pub use scheduler::{OrchestratorJob, SchedulerState, schedule};
pub use staging::stage_outputs;

/// The initial task graph for running `executable` over `job_order`, and
/// the task whose result is the final output.
pub fn build_graph(
  executable: &Executable,
  job_order: Map<String, Value>,
  caps: &Capabilities,
) -> Result<(TaskGraph, TaskId), OrchestratorError> {
  let mut ctx = JobContext::detached();
  let built = make_task(&mut ctx, executable, PendingInput::from_literals(job_order), caps)?;
  Ok((ctx.into_staged(), built.result))
}

/// Run `executable` to completion and return its resolved outputs.
pub async fn run_workflow<N: ExecutionNotifier>(
  engine: &LocalEngine<N>,
  executable: &Executable,
  job_order: Map<String, Value>,
  caps: &Capabilities,
  cancel: CancellationToken,
) -> Result<Value, OrchestratorError> {
  let (graph, result) = build_graph(executable, job_order, caps)?;
  info!(process_id = %executable.id(), tasks = graph.len(), "workflow_submitted");
  Ok(engine.run(graph, result, cancel).await?)
}
