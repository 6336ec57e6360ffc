//! Scatter and gather jobs.
//!
//! A scattered step becomes a [`ScatterJob`] with a [`GatherJob`] follow-on.
//! The scatter resolves its inputs, builds one input snapshot per element
//! and constructs a task for each. The gather runs once all of them are done
//! and pulls each output key back out in the same nesting.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strand_engine::{BoxError, Job, JobContext, JobKind, TaskId, TaskOutput};
use strand_expr::EvalContext;
use strand_workflow::Step;
use tracing::{info, instrument};

use crate::capabilities::Capabilities;
use crate::construct::make_task;
use crate::error::OrchestratorError;
use crate::pending::PendingInput;

/// How several scattered inputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterMethod {
  /// Positional pairing; all lists must have the same length.
  Dotproduct,
  /// Every combination, one nesting level per key.
  NestedCrossproduct,
  /// Every combination, as one flat list in row-major order.
  FlatCrossproduct,
}

impl ScatterMethod {
  /// The method for `step`. A single key is always a dotproduct.
  pub fn for_step(step: &Step) -> Result<Self, OrchestratorError> {
    match step.scatter_keys().len() {
      0 => return Err(empty_scatter(step)),
      1 => return Ok(ScatterMethod::Dotproduct),
      _ => {}
    }

    let method = step.scatter.as_ref().and_then(|s| s.method.as_deref());
    match method {
      Some("dotproduct") => Ok(ScatterMethod::Dotproduct),
      Some("nested_crossproduct") => Ok(ScatterMethod::NestedCrossproduct),
      Some("flat_crossproduct") => Ok(ScatterMethod::FlatCrossproduct),
      other => Err(OrchestratorError::UnsupportedScatterMethod {
        step_id: step.id.clone(),
        method: other.map(str::to_string),
      }),
    }
  }
}

fn empty_scatter(step: &Step) -> OrchestratorError {
  OrchestratorError::EmptyScatter {
    step_id: step.id.clone(),
  }
}

/// Expands one step into a task per element.
#[derive(Debug)]
pub struct ScatterJob {
  step: Arc<Step>,
  inputs: PendingInput,
  caps: Capabilities,
}

impl ScatterJob {
  pub fn new(step: Arc<Step>, inputs: PendingInput, caps: Capabilities) -> Self {
    Self { step, inputs, caps }
  }

  fn expand(&self, ctx: &mut JobContext) -> Result<TaskOutput, OrchestratorError> {
    let job_order = self.inputs.resolve(ctx, self.caps.evaluator.as_ref())?;
    let method = ScatterMethod::for_step(&self.step)?;
    let keys = self.step.scatter_keys();

    let output = match method {
      ScatterMethod::Dotproduct => self.dotproduct(ctx, &job_order, keys)?,
      ScatterMethod::NestedCrossproduct => self.nested(ctx, &job_order, keys)?,
      ScatterMethod::FlatCrossproduct => {
        let mut outputs = Vec::new();
        self.flat(ctx, &job_order, keys, &mut outputs)?;
        TaskOutput::List(outputs)
      }
    };

    info!(
      step_id = %self.step.id,
      method = ?method,
      tasks = ctx.staged().len(),
      "scatter_expanded"
    );

    Ok(output)
  }

  fn elements<'a>(
    &self,
    job_order: &'a Map<String, Value>,
    key: &str,
  ) -> Result<&'a Vec<Value>, OrchestratorError> {
    job_order
      .get(key)
      .and_then(Value::as_array)
      .ok_or_else(|| OrchestratorError::ScatterInputNotList {
        step_id: self.step.id.clone(),
        key: key.to_string(),
      })
  }

  fn dotproduct(
    &self,
    ctx: &mut JobContext,
    job_order: &Map<String, Value>,
    keys: &[String],
  ) -> Result<TaskOutput, OrchestratorError> {
    let Some((first, rest)) = keys.split_first() else {
      return Err(empty_scatter(&self.step));
    };
    let expected = self.elements(job_order, first)?.len();
    for key in rest {
      let actual = self.elements(job_order, key)?.len();
      if actual != expected {
        return Err(OrchestratorError::ScatterShapeMismatch {
          step_id: self.step.id.clone(),
          key: key.clone(),
          expected,
          actual,
        });
      }
    }

    let mut outputs = Vec::with_capacity(expected);
    for i in 0..expected {
      let mut element = job_order.clone();
      for key in keys {
        let value = self.elements(job_order, key)?[i].clone();
        element.insert(key.clone(), value);
      }
      outputs.push(self.spawn(ctx, element)?);
    }
    Ok(TaskOutput::List(outputs))
  }

  fn nested(
    &self,
    ctx: &mut JobContext,
    job_order: &Map<String, Value>,
    keys: &[String],
  ) -> Result<TaskOutput, OrchestratorError> {
    let Some((key, rest)) = keys.split_first() else {
      return Err(empty_scatter(&self.step));
    };
    let items = self.elements(job_order, key)?;

    let mut outputs = Vec::with_capacity(items.len());
    for item in items {
      let mut element = job_order.clone();
      element.insert(key.clone(), item.clone());
      if rest.is_empty() {
        outputs.push(self.spawn(ctx, element)?);
      } else {
        outputs.push(self.nested(ctx, &element, rest)?);
      }
    }
    Ok(TaskOutput::List(outputs))
  }

  fn flat(
    &self,
    ctx: &mut JobContext,
    job_order: &Map<String, Value>,
    keys: &[String],
    outputs: &mut Vec<TaskOutput>,
  ) -> Result<(), OrchestratorError> {
    let Some((key, rest)) = keys.split_first() else {
      return Err(empty_scatter(&self.step));
    };
    for item in self.elements(job_order, key)? {
      let mut element = job_order.clone();
      element.insert(key.clone(), item.clone());
      if rest.is_empty() {
        outputs.push(self.spawn(ctx, element)?);
      } else {
        self.flat(ctx, &element, rest, outputs)?;
      }
    }
    Ok(())
  }

  /// Apply step `value_from` expressions to one element's snapshot.
  fn post_scatter_eval(
    &self,
    element: Map<String, Value>,
  ) -> Result<Map<String, Value>, OrchestratorError> {
    let value_from: HashMap<&str, &str> = self
      .step
      .inputs
      .iter()
      .filter_map(|input| Some((input.id.as_str(), input.value_from.as_deref()?)))
      .collect();
    if value_from.is_empty() {
      return Ok(element);
    }

    let mut evaluated = Map::new();
    for (key, value) in &element {
      let value = match value_from.get(key.as_str()) {
        Some(expression) => {
          let context = EvalContext::new(element.clone())
            .with_value(value.clone())
            .with_globals(self.step.requirements.globals.clone());
          self.caps.evaluator.evaluate(expression, &context)?
        }
        None => value.clone(),
      };
      evaluated.insert(key.clone(), value);
    }
    Ok(evaluated)
  }

  fn spawn(
    &self,
    ctx: &mut JobContext,
    element: Map<String, Value>,
  ) -> Result<TaskOutput, OrchestratorError> {
    let element = self.post_scatter_eval(element)?;
    let built = make_task(
      ctx,
      &self.step.run,
      PendingInput::from_literals(element),
      &self.caps,
    )?;
    let current = ctx.current();
    ctx.add_child(current, built.entry);
    Ok(TaskOutput::Promise(built.result))
  }
}

#[async_trait]
impl Job for ScatterJob {
  fn kind(&self) -> JobKind {
    JobKind::ScatterExpand
  }

  fn name(&self) -> String {
    self.step.id.clone()
  }

  #[instrument(name = "scatter", skip(self, ctx), fields(step_id = %self.step.id))]
  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    Ok(self.expand(ctx)?)
  }
}

/// Reassembles a scatter's per-element results, per output key.
#[derive(Debug)]
pub struct GatherJob {
  step: Arc<Step>,
  scatter: TaskId,
}

impl GatherJob {
  pub fn new(step: Arc<Step>, scatter: TaskId) -> Self {
    Self { step, scatter }
  }

  fn collect(&self, ctx: &JobContext) -> Result<Value, OrchestratorError> {
    let results = ctx.resolve(&ctx.result(self.scatter)?)?;
    let outputs: Map<String, Value> = self
      .step
      .outputs
      .iter()
      .map(|key| (key.clone(), extract(&results, key)))
      .collect();
    Ok(Value::Object(outputs))
  }
}

/// Pull `key` out of every result mapping, keeping list nesting.
pub fn extract(value: &Value, key: &str) -> Value {
  match value {
    Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
    Value::Array(items) => Value::Array(items.iter().map(|item| extract(item, key)).collect()),
    _ => Value::Array(Vec::new()),
  }
}

#[async_trait]
impl Job for GatherJob {
  fn kind(&self) -> JobKind {
    JobKind::GatherCollect
  }

  fn name(&self) -> String {
    self.step.id.clone()
  }

  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    Ok(TaskOutput::Value(self.collect(ctx)?))
  }
}
