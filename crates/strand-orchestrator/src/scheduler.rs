//! The fixpoint scheduler.
//!
//! Each pass walks the steps that are not yet scheduled and constructs those
//! whose sources are all known. Constructing a step publishes promises for
//! its outputs, which may make further steps schedulable on the next pass.
//! Passes repeat until every step is scheduled and every workflow output
//! source is known; a pass that publishes nothing new means the graph can
//! never complete.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strand_engine::{BoxError, Job, JobContext, JobKind, Resources, TaskId, TaskOutput, TaskSpec};
use strand_workflow::{Executable, Step, StepInput, Workflow, WorkflowOutput};
use tracing::{debug, info, instrument};

use crate::capabilities::Capabilities;
use crate::construct::{Construction, make_task};
use crate::error::OrchestratorError;
use crate::pending::{DeferredExpression, LinkMerge, MergeSpec, PendingInput, PendingValue};
use crate::promise::{Producer, Promise, PromiseMap};
use crate::scatter::{GatherJob, ScatterJob};

/// State owned by one scheduling run.
#[derive(Debug, Default)]
pub struct SchedulerState {
  pub promises: PromiseMap,
  pub scheduled: HashSet<String>,
}

impl SchedulerState {
  /// Seed the promise map with every workflow input.
  pub fn seeded(workflow: &Workflow, job_order: Arc<Map<String, Value>>) -> Self {
    let mut state = Self::default();
    for input in &workflow.inputs {
      let promise = Promise::new(input.id.clone(), Producer::Inputs(job_order.clone()));
      state.promises.insert(input.id.clone(), promise);
    }
    state
  }

  fn progress(&self) -> (usize, usize) {
    (self.promises.len(), self.scheduled.len())
  }

  fn is_schedulable(&self, step: &Step) -> bool {
    step.sources().all(|source| self.promises.contains(source))
  }

  fn outputs_known(&self, workflow: &Workflow) -> bool {
    workflow
      .outputs
      .iter()
      .flat_map(|output| output.output_source.as_slice())
      .all(|source| self.promises.contains(source))
  }

  fn is_complete(&self, workflow: &Workflow) -> bool {
    self.scheduled.len() == workflow.steps.len() && self.outputs_known(workflow)
  }
}

/// Schedule every step of `workflow` into `ctx` and return the pending
/// output object.
pub fn schedule(
  ctx: &mut JobContext,
  workflow: &Workflow,
  job_order: Arc<Map<String, Value>>,
  caps: &Capabilities,
) -> Result<PendingInput, OrchestratorError> {
  let mut state = SchedulerState::seeded(workflow, job_order);

  while !state.is_complete(workflow) {
    let before = state.progress();
    schedule_pass(ctx, workflow, &mut state, caps)?;
    if state.progress() == before {
      return Err(unsatisfiable(workflow, &state));
    }
  }

  workflow_outputs(workflow, &state)
}

/// One pass over the unscheduled steps.
pub fn schedule_pass(
  ctx: &mut JobContext,
  workflow: &Workflow,
  state: &mut SchedulerState,
  caps: &Capabilities,
) -> Result<(), OrchestratorError> {
  for step in &workflow.steps {
    if state.scheduled.contains(&step.id) || !state.is_schedulable(step) {
      continue;
    }

    let inputs = step_inputs(step, &state.promises)?;
    let built = if step.is_scattered() {
      let scatter = ctx.add_task(TaskSpec::new(
        Arc::new(ScatterJob::new(step.clone(), inputs, caps.clone())),
        Resources::default(),
      ));
      let gather = ctx.add_task(TaskSpec::new(
        Arc::new(GatherJob::new(step.clone(), scatter)),
        Resources::default(),
      ));
      ctx.add_follow_on(scatter, gather);
      Construction {
        entry: scatter,
        result: gather,
      }
    } else {
      make_task(ctx, &step.run, inputs, caps)?
    };

    wire(ctx, step, &state.promises, built.entry);

    for output in &step.outputs {
      let promise = Promise::new(output.clone(), Producer::Task(built.result));
      state.promises.insert(step.output_id(output), promise);
    }
    state.scheduled.insert(step.id.clone());

    info!(
      step_id = %step.id,
      kind = step_kind(step),
      entry = %built.entry,
      result = %built.result,
      "step_scheduled"
    );
  }

  Ok(())
}

fn step_kind(step: &Step) -> &'static str {
  match (&step.run, step.is_scattered()) {
    (_, true) => "scatter",
    (Executable::Workflow(_), false) => "workflow",
    (Executable::Tool(_), false) => "tool",
  }
}

/// Hang `entry` under the producers of everything it reads. Workflow inputs
/// and steps with no sources hang under the running orchestrator.
fn wire(ctx: &mut JobContext, step: &Step, promises: &PromiseMap, entry: TaskId) {
  let current = ctx.current();
  let mut connected = false;

  for source in step.sources() {
    let Some(producer) = promises.producer(source) else {
      continue;
    };
    match producer {
      Producer::Task(id) => ctx.add_dependent(*id, entry),
      Producer::Inputs(_) => ctx.add_child(current, entry),
    }
    connected = true;
  }

  if !connected {
    ctx.add_child(current, entry);
  }
}

/// Build the pending input object for one step.
pub fn step_inputs(step: &Step, promises: &PromiseMap) -> Result<PendingInput, OrchestratorError> {
  let mut inputs = PendingInput::new();

  for port in &step.inputs {
    let value = port_value(port, promises)?;
    let value = match (&port.value_from, step.is_scattered()) {
      (Some(expression), false) => PendingValue::Deferred(DeferredExpression {
        expression: expression.clone(),
        underlying: Box::new(value.unwrap_or(PendingValue::Literal(Value::Null))),
        requirements: Arc::new(step.requirements.clone()),
      }),
      _ => match value {
        Some(value) => value,
        None => continue,
      },
    };
    inputs.insert(port.id.clone(), value);
  }

  Ok(inputs)
}

fn port_value(
  port: &StepInput,
  promises: &PromiseMap,
) -> Result<Option<PendingValue>, OrchestratorError> {
  let sources = port.sources();
  if sources.len() > 1 || port.link_merge.is_some() {
    let policy = LinkMerge::parse(port.link_merge.as_deref())?;
    return Ok(Some(PendingValue::Merge(MergeSpec {
      sources: known(sources, promises),
      policy,
    })));
  }

  if let Some(source) = sources.first() {
    return Ok(promises.promise(source).map(PendingValue::Promise));
  }

  Ok(port.default.clone().map(PendingValue::Literal))
}

fn known(sources: &[String], promises: &PromiseMap) -> Vec<Promise> {
  sources
    .iter()
    .filter_map(|source| promises.promise(source))
    .collect()
}

/// The workflow's output object, in terms of promises.
fn workflow_outputs(
  workflow: &Workflow,
  state: &SchedulerState,
) -> Result<PendingInput, OrchestratorError> {
  let mut outputs = PendingInput::new();
  for output in &workflow.outputs {
    outputs.insert(output.id.clone(), output_value(output, &state.promises)?);
  }
  Ok(outputs)
}

fn output_value(
  output: &WorkflowOutput,
  promises: &PromiseMap,
) -> Result<PendingValue, OrchestratorError> {
  let sources = output.output_source.as_slice();
  if sources.len() > 1 || output.link_merge.is_some() {
    let policy = LinkMerge::parse(output.link_merge.as_deref())?;
    return Ok(PendingValue::Merge(MergeSpec {
      sources: known(sources, promises),
      policy,
    }));
  }

  Ok(
    sources
      .first()
      .and_then(|source| promises.promise(source))
      .map(PendingValue::Promise)
      .unwrap_or(PendingValue::Literal(Value::Null)),
  )
}

fn unsatisfiable(workflow: &Workflow, state: &SchedulerState) -> OrchestratorError {
  let unscheduled: Vec<String> = workflow
    .steps
    .iter()
    .filter(|step| !state.scheduled.contains(&step.id))
    .map(|step| step.id.clone())
    .collect();

  let mut missing: Vec<String> = workflow
    .steps
    .iter()
    .filter(|step| !state.scheduled.contains(&step.id))
    .flat_map(|step| step.sources())
    .chain(
      workflow
        .outputs
        .iter()
        .flat_map(|output| output.output_source.as_slice()),
    )
    .filter(|source| !state.promises.contains(source))
    .cloned()
    .collect();
  missing.sort();
  missing.dedup();

  OrchestratorError::GraphUnsatisfiable {
    workflow_id: workflow.id.clone(),
    unscheduled,
    missing,
  }
}

/// Schedules one workflow's steps when it runs.
///
/// Its result is the pending output object; the resolve follow-on
/// collapses it once every scheduled task has completed.
#[derive(Debug)]
pub struct OrchestratorJob {
  workflow: Arc<Workflow>,
  inputs: PendingInput,
  caps: Capabilities,
}

impl OrchestratorJob {
  pub fn new(workflow: Arc<Workflow>, inputs: PendingInput, caps: Capabilities) -> Self {
    Self {
      workflow,
      inputs,
      caps,
    }
  }

  fn orchestrate(&self, ctx: &mut JobContext) -> Result<Value, OrchestratorError> {
    let mut job_order = self.inputs.resolve(ctx, self.caps.evaluator.as_ref())?;
    for input in &self.workflow.inputs {
      let Some(default) = &input.default else {
        continue;
      };
      if job_order.get(&input.id).is_none_or(Value::is_null) {
        job_order.insert(input.id.clone(), default.clone());
      }
    }
    debug!(inputs = ?job_order.keys().collect::<Vec<_>>(), "workflow_inputs_resolved");

    let outputs = schedule(ctx, &self.workflow, Arc::new(job_order), &self.caps)?;

    info!(
      workflow_id = %self.workflow.id,
      steps = self.workflow.steps.len(),
      tasks = ctx.staged().len(),
      "workflow_scheduled"
    );

    Ok(serde_json::to_value(&outputs)?)
  }
}

#[async_trait]
impl Job for OrchestratorJob {
  fn kind(&self) -> JobKind {
    JobKind::Orchestrate
  }

  fn name(&self) -> String {
    self.workflow.id.clone()
  }

  #[instrument(name = "orchestrate", skip(self, ctx), fields(workflow_id = %self.workflow.id))]
  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    Ok(TaskOutput::Value(self.orchestrate(ctx)?))
  }
}
