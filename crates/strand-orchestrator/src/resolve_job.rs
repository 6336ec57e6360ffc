//! Follow-on that collapses a workflow's output object.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use strand_engine::{BoxError, Job, JobContext, JobKind, TaskId, TaskOutput};
use strand_expr::Evaluator;
use tracing::{debug, instrument};

use crate::error::OrchestratorError;
use crate::pending::PendingInput;

/// Resolves the pending output object an orchestrator returned.
///
/// Runs as the orchestrator's follow-on, so every step the orchestrator
/// scheduled has completed by the time it reads the promises.
pub struct ResolveIndirectJob {
  source: TaskId,
  workflow_id: String,
  evaluator: Arc<dyn Evaluator>,
}

impl ResolveIndirectJob {
  pub fn new(source: TaskId, workflow_id: String, evaluator: Arc<dyn Evaluator>) -> Self {
    Self {
      source,
      workflow_id,
      evaluator,
    }
  }

  fn collapse(&self, ctx: &JobContext) -> Result<Value, OrchestratorError> {
    let encoded = ctx.resolve(&ctx.result(self.source)?)?;
    let pending: PendingInput = serde_json::from_value(encoded)?;
    debug!(outputs = pending.len(), "resolving_workflow_outputs");
    let outputs = pending.resolve(ctx, self.evaluator.as_ref())?;
    Ok(Value::Object(outputs))
  }
}

impl std::fmt::Debug for ResolveIndirectJob {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResolveIndirectJob")
      .field("source", &self.source)
      .field("workflow_id", &self.workflow_id)
      .finish_non_exhaustive()
  }
}

#[async_trait]
impl Job for ResolveIndirectJob {
  fn kind(&self) -> JobKind {
    JobKind::IndirectResolve
  }

  fn name(&self) -> String {
    self.workflow_id.clone()
  }

  #[instrument(name = "resolve_outputs", skip(self, ctx), fields(workflow_id = %self.workflow_id))]
  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    Ok(TaskOutput::Value(self.collapse(ctx)?))
  }
}
