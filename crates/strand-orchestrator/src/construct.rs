//! Resource-aware task construction.
//!
//! A leaf tool whose resource requirement is fully literal becomes a
//! [`LeafJob`] sized right away. If any field is an expression, a small
//! [`DeferredJob`] is scheduled instead; once its inputs resolve it sizes
//! and spawns the real leaf as its child and forwards that child's result.
//! A nested workflow becomes an orchestrator with a resolve follow-on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strand_engine::{BoxError, Job, JobContext, JobKind, Resources, TaskId, TaskOutput, TaskSpec};
use strand_expr::{EvalContext, Evaluator};
use strand_tool::{Runtime, ToolInvocation, fill_in_defaults};
use strand_workflow::{Executable, ResourceRequirement, ResourceValue, ToolDef};
use tracing::{info, instrument};

use crate::capabilities::Capabilities;
use crate::error::OrchestratorError;
use crate::pending::PendingInput;
use crate::resolve_job::ResolveIndirectJob;
use crate::scheduler::OrchestratorJob;

const MIB: u64 = 1024 * 1024;

const DEFAULT_CORES: f64 = 1.0;
const DEFAULT_RAM_MIB: f64 = 1024.0;
const DEFAULT_TMPDIR_MIB: f64 = 1024.0;
const DEFAULT_OUTDIR_MIB: f64 = 1024.0;

/// Task handles for one constructed unit of work.
///
/// `entry` is what gets wired under its producers; `result` is what
/// downstream promises point at. They differ when the result is produced by
/// a follow-on (gather, nested workflow resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Construction {
  pub entry: TaskId,
  pub result: TaskId,
}

impl Construction {
  fn single(id: TaskId) -> Self {
    Self {
      entry: id,
      result: id,
    }
  }
}

/// Reservation for a deferred wrapper: it only resolves inputs.
pub fn deferred_resources() -> Resources {
  Resources::new(0.1, MIB, 1)
}

/// Add the task(s) that run `executable` over `inputs`.
pub fn make_task(
  ctx: &mut JobContext,
  executable: &Executable,
  inputs: PendingInput,
  caps: &Capabilities,
) -> Result<Construction, OrchestratorError> {
  match executable {
    Executable::Workflow(workflow) => {
      let orchestrator = ctx.add_task(TaskSpec::new(
        Arc::new(OrchestratorJob::new(workflow.clone(), inputs, caps.clone())),
        Resources::default(),
      ));
      let follow_on = ctx.add_task(TaskSpec::new(
        Arc::new(ResolveIndirectJob::new(
          orchestrator,
          workflow.id.clone(),
          caps.evaluator.clone(),
        )),
        Resources::default(),
      ));
      ctx.add_follow_on(orchestrator, follow_on);
      Ok(Construction {
        entry: orchestrator,
        result: follow_on,
      })
    }
    Executable::Tool(tool) => {
      let dynamic = tool
        .requirements
        .resources
        .as_ref()
        .is_some_and(ResourceRequirement::is_dynamic);

      let id = if dynamic {
        ctx.add_task(TaskSpec::new(
          Arc::new(DeferredJob::new(tool.clone(), inputs, caps.clone())),
          deferred_resources(),
        ))
      } else {
        let resources = literal_resources(tool.requirements.resources.as_ref())?;
        ctx.add_task(TaskSpec::new(
          Arc::new(LeafJob::new(tool.clone(), inputs, caps.clone())),
          resources,
        ))
      };
      Ok(Construction::single(id))
    }
  }
}

/// Size a task from literal values only.
pub fn literal_resources(req: Option<&ResourceRequirement>) -> Result<Resources, OrchestratorError> {
  size(req, |field, value| match value {
    ResourceValue::Fixed(n) => non_negative(field, *n, n).map(Some),
    ResourceValue::Expression(s) => match s.trim().parse::<f64>() {
      Ok(n) => non_negative(field, n, s).map(Some),
      Err(_) => Err(invalid_resource(field, s)),
    },
  })
}

/// Size a task, evaluating expressions against concrete inputs.
pub fn evaluate_resources(
  req: Option<&ResourceRequirement>,
  evaluator: &dyn Evaluator,
  context: &EvalContext,
) -> Result<Resources, OrchestratorError> {
  size(req, |field, value| match value {
    ResourceValue::Fixed(n) => non_negative(field, *n, n).map(Some),
    ResourceValue::Expression(expr) => {
      let evaluated = evaluator.evaluate(expr, context)?;
      let number = match &evaluated {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => return Ok(None),
        _ => None,
      };
      match number {
        Some(n) => non_negative(field, n, &evaluated).map(Some),
        None => Err(invalid_resource(field, &evaluated)),
      }
    }
  })
}

fn non_negative(field: &str, n: f64, raw: impl ToString) -> Result<f64, OrchestratorError> {
  if n.is_finite() && n >= 0.0 {
    Ok(n)
  } else {
    Err(invalid_resource(field, raw))
  }
}

fn invalid_resource(field: &str, raw: impl ToString) -> OrchestratorError {
  OrchestratorError::InvalidResource {
    field: field.to_string(),
    value: raw.to_string(),
  }
}

/// Pick min, then max, for each of cores, ram, tmpdir and outdir.
fn size<F>(req: Option<&ResourceRequirement>, mut value_of: F) -> Result<Resources, OrchestratorError>
where
  F: FnMut(&str, &ResourceValue) -> Result<Option<f64>, OrchestratorError>,
{
  let Some(req) = req else {
    return Ok(size_from([None; 4]));
  };

  let mut pick = |pairs: [(&str, &Option<ResourceValue>); 2]| -> Result<Option<f64>, OrchestratorError> {
    for (field, value) in pairs {
      if let Some(value) = value {
        if let Some(n) = value_of(field, value)? {
          return Ok(Some(n));
        }
      }
    }
    Ok(None)
  };

  let cores = pick([("cores_min", &req.cores_min), ("cores_max", &req.cores_max)])?;
  let ram = pick([("ram_min", &req.ram_min), ("ram_max", &req.ram_max)])?;
  let tmpdir = pick([("tmpdir_min", &req.tmpdir_min), ("tmpdir_max", &req.tmpdir_max)])?;
  let outdir = pick([("outdir_min", &req.outdir_min), ("outdir_max", &req.outdir_max)])?;

  Ok(size_from([cores, ram, tmpdir, outdir]))
}

fn size_from([cores, ram, tmpdir, outdir]: [Option<f64>; 4]) -> Resources {
  let mib = |n: f64| (n.max(0.0) * MIB as f64).round() as u64;
  Resources::new(
    cores.unwrap_or(DEFAULT_CORES),
    mib(ram.unwrap_or(DEFAULT_RAM_MIB)),
    mib(tmpdir.unwrap_or(DEFAULT_TMPDIR_MIB)) + mib(outdir.unwrap_or(DEFAULT_OUTDIR_MIB)),
  )
}

/// Runs one leaf tool.
#[derive(Debug)]
pub struct LeafJob {
  tool: Arc<ToolDef>,
  inputs: PendingInput,
  caps: Capabilities,
}

impl LeafJob {
  pub fn new(tool: Arc<ToolDef>, inputs: PendingInput, caps: Capabilities) -> Self {
    Self { tool, inputs, caps }
  }

  async fn execute(&self, ctx: &JobContext) -> Result<Map<String, Value>, OrchestratorError> {
    let mut inputs = self.inputs.resolve(ctx, self.caps.evaluator.as_ref())?;
    fill_in_defaults(&self.tool, &mut inputs);

    let task_id = ctx.current().to_string();
    let resources = ctx.resources();
    let invocation = ToolInvocation {
      runtime: Runtime {
        cores: resources.cores,
        memory: resources.memory,
        disk: resources.disk,
        outdir: self.caps.executor_config.task_dir(&task_id),
      },
      task_id,
      tool: self.tool.clone(),
      inputs,
      evaluator: self.caps.evaluator.clone(),
    };

    Ok(self.caps.executor.execute(&invocation).await?)
  }
}

#[async_trait]
impl Job for LeafJob {
  fn kind(&self) -> JobKind {
    JobKind::LeafExecute
  }

  fn name(&self) -> String {
    self.tool.id.clone()
  }

  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    let outputs = self.execute(ctx).await?;
    Ok(TaskOutput::Value(Value::Object(outputs)))
  }
}

/// Placeholder for a tool whose resources depend on its inputs.
#[derive(Debug)]
pub struct DeferredJob {
  tool: Arc<ToolDef>,
  inputs: PendingInput,
  caps: Capabilities,
}

impl DeferredJob {
  pub fn new(tool: Arc<ToolDef>, inputs: PendingInput, caps: Capabilities) -> Self {
    Self { tool, inputs, caps }
  }

  fn expand(&self, ctx: &mut JobContext) -> Result<TaskId, OrchestratorError> {
    let evaluator = self.caps.evaluator.as_ref();
    let mut inputs = self.inputs.resolve(ctx, evaluator)?;
    fill_in_defaults(&self.tool, &mut inputs);

    let context = EvalContext::new(inputs.clone())
      .with_globals(self.tool.requirements.globals.clone());
    let resources = evaluate_resources(
      self.tool.requirements.resources.as_ref(),
      evaluator,
      &context,
    )?;

    info!(
      tool_id = %self.tool.id,
      cores = resources.cores,
      memory = resources.memory,
      disk = resources.disk,
      "deferred_task_sized"
    );

    let leaf = LeafJob::new(
      self.tool.clone(),
      PendingInput::from_literals(inputs),
      self.caps.clone(),
    );
    let child = ctx.add_task(TaskSpec::new(Arc::new(leaf), resources));
    let current = ctx.current();
    ctx.add_child(current, child);
    Ok(child)
  }
}

#[async_trait]
impl Job for DeferredJob {
  fn kind(&self) -> JobKind {
    JobKind::DeferredWrap
  }

  fn name(&self) -> String {
    self.tool.id.clone()
  }

  #[instrument(name = "deferred_wrap", skip(self, ctx), fields(tool_id = %self.tool.id))]
  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    let child = self.expand(ctx)?;
    Ok(TaskOutput::Promise(child))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{RecordingExecutor, capabilities, tool};
  use serde_json::json;
  use strand_expr::TemplateEvaluator;

  #[test]
  fn test_defaults_when_unset() {
    let resources = literal_resources(None).unwrap();
    assert_eq!(resources, Resources::new(1.0, 1024 * MIB, 2048 * MIB));
  }

  #[test]
  fn test_literal_min_then_max() {
    let req: ResourceRequirement = serde_json::from_value(json!({
      "cores_min": 2,
      "cores_max": 8,
      "ram_max": 512,
      "tmpdir_min": "100",
      "outdir_max": 50
    }))
    .unwrap();

    let resources = literal_resources(Some(&req)).unwrap();
    assert_eq!(resources.cores, 2.0);
    assert_eq!(resources.memory, 512 * MIB);
    assert_eq!(resources.disk, 150 * MIB);
  }

  #[test]
  fn test_literal_resources_reject_bad_values() {
    let word: ResourceRequirement = serde_json::from_value(json!({ "cores_min": "lots" })).unwrap();
    let err = literal_resources(Some(&word)).unwrap_err();
    assert!(matches!(
      err,
      OrchestratorError::InvalidResource { field, value } if field == "cores_min" && value == "lots"
    ));

    let negative: ResourceRequirement =
      serde_json::from_value(json!({ "cores_max": -4, "ram_min": 16 })).unwrap();
    let err = literal_resources(Some(&negative)).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidResource { field, .. } if field == "cores_max"));
  }

  #[test]
  fn test_bad_literal_resources_fail_construction() {
    let caps = capabilities(RecordingExecutor::default());
    let exe = tool(json!({
      "id": "oversized",
      "requirements": { "resources": { "cores_min": "lots", "cores_max": -4 } }
    }));
    let mut ctx = JobContext::detached();

    let err = make_task(&mut ctx, &exe, PendingInput::new(), &caps).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidResource { .. }));
    assert!(ctx.staged().is_empty());
  }

  #[test]
  fn test_evaluate_resources() {
    let req: ResourceRequirement = serde_json::from_value(json!({
      "cores_min": "{{ inputs.n }}",
      "ram_min": "{{ inputs.n * 100 }}"
    }))
    .unwrap();
    let context = EvalContext::new(json!({ "n": 3 }).as_object().cloned().unwrap());

    let resources = evaluate_resources(Some(&req), &TemplateEvaluator::new(), &context).unwrap();
    assert_eq!(resources.cores, 3.0);
    assert_eq!(resources.memory, 300 * MIB);
  }

  #[test]
  fn test_evaluate_resources_rejects_non_numbers() {
    let req: ResourceRequirement =
      serde_json::from_value(json!({ "cores_min": "{{ inputs.name }}" })).unwrap();
    let context = EvalContext::new(json!({ "name": "many" }).as_object().cloned().unwrap());

    let err = evaluate_resources(Some(&req), &TemplateEvaluator::new(), &context).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidResource { field, .. } if field == "cores_min"));

    let negative = EvalContext::new(json!({ "name": -2 }).as_object().cloned().unwrap());
    let err = evaluate_resources(Some(&req), &TemplateEvaluator::new(), &negative).unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidResource { value, .. } if value == "-2"));
  }

  #[test]
  fn test_literal_resources_build_plain_task() {
    let caps = capabilities(RecordingExecutor::default());
    let exe = tool(json!({
      "id": "sized",
      "requirements": { "resources": { "cores_min": 2, "ram_min": 256 } }
    }));
    let mut ctx = JobContext::detached();

    let built = make_task(&mut ctx, &exe, PendingInput::new(), &caps).unwrap();

    assert_eq!(built.entry, built.result);
    let spec = ctx.staged().get(built.entry).unwrap();
    assert_eq!(spec.job.kind(), JobKind::LeafExecute);
    assert_eq!(spec.resources.cores, 2.0);
    assert_eq!(spec.resources.memory, 256 * MIB);
  }

  #[tokio::test]
  async fn test_leaf_fills_tool_defaults() {
    let executor = RecordingExecutor::default();
    let caps = capabilities(executor.clone());
    let exe = tool(json!({
      "id": "leaf",
      "inputs": [{ "id": "x" }, { "id": "y", "default": "dflt" }],
      "outputs": [{ "id": "out", "value": "{{ inputs.x ~ inputs.y }}" }]
    }));
    let mut ctx = JobContext::detached();
    let inputs = PendingInput::from_literals(json!({ "x": "a", "y": null }).as_object().cloned().unwrap());

    let built = make_task(&mut ctx, &exe, inputs, &caps).unwrap();
    let spec = ctx.staged().get(built.entry).unwrap().clone();
    let output = spec.job.run(&mut JobContext::detached()).await.unwrap();

    assert_eq!(output, TaskOutput::Value(json!({ "out": "adflt" })));
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "leaf");
    assert_eq!(calls[0].1["y"], json!("dflt"));
  }

  #[tokio::test]
  async fn test_dynamic_resources_defer_construction() {
    let caps = capabilities(RecordingExecutor::default());
    let exe = tool(json!({
      "id": "sized",
      "inputs": [{ "id": "n", "default": 4 }],
      "requirements": { "resources": { "cores_min": "{{ inputs.n }}" } }
    }));
    let mut ctx = JobContext::detached();

    let built = make_task(&mut ctx, &exe, PendingInput::new(), &caps).unwrap();
    let spec = ctx.staged().get(built.entry).unwrap().clone();
    assert_eq!(spec.job.kind(), JobKind::DeferredWrap);
    assert_eq!(spec.resources, deferred_resources());
    assert_eq!(ctx.staged().len(), 1);

    // Running the wrapper creates the real task, sized from its inputs.
    let mut run_ctx = JobContext::detached();
    let output = spec.job.run(&mut run_ctx).await.unwrap();
    let TaskOutput::Promise(child) = output else {
      panic!("expected forwarded promise");
    };

    let staged = run_ctx.staged();
    assert_eq!(staged.len(), 1);
    assert!(staged.has_child(run_ctx.current(), child));
    let child_spec = staged.get(child).unwrap();
    assert_eq!(child_spec.job.kind(), JobKind::LeafExecute);
    assert_eq!(child_spec.resources.cores, 4.0);
  }
}
