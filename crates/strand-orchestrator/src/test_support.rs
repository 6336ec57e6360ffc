//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use strand_config::{Process, ToolDef};
use strand_expr::{EvalContext, TemplateEvaluator};
use strand_tool::{ExecutorConfig, ToolError, ToolExecutor, ToolInvocation};
use strand_workflow::{Executable, Workflow};

use crate::capabilities::Capabilities;

/// Records every invocation and evaluates outputs without touching disk.
///
/// An output with a `value` expression evaluates it against the inputs; one
/// without echoes the input of the same name.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
  calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
}

impl RecordingExecutor {
  pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
  async fn execute(&self, invocation: &ToolInvocation) -> Result<Map<String, Value>, ToolError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((invocation.tool.id.clone(), invocation.inputs.clone()));

    let context = EvalContext::new(invocation.inputs.clone());
    let mut outputs = Map::new();
    for output in &invocation.tool.outputs {
      let value = match &output.value {
        Some(expression) => invocation
          .evaluator
          .evaluate(expression, &context)
          .map_err(|source| ToolError::Expression {
            tool_id: invocation.tool.id.clone(),
            source,
          })?,
        None => invocation.inputs.get(&output.id).cloned().unwrap_or(Value::Null),
      };
      outputs.insert(output.id.clone(), value);
    }
    Ok(outputs)
  }
}

pub fn capabilities(executor: impl ToolExecutor + 'static) -> Capabilities {
  Capabilities::new(
    Arc::new(executor),
    Arc::new(TemplateEvaluator::new()),
    ExecutorConfig {
      work_dir: std::env::temp_dir().join("strand-orchestrator-tests"),
    },
  )
}

/// A tool from its document form (without `class`).
pub fn tool(doc: Value) -> Executable {
  let tool: ToolDef = serde_json::from_value(doc).unwrap();
  Executable::Tool(Arc::new(tool))
}

/// A locked workflow from its document form.
pub fn workflow(doc: Value) -> Arc<Workflow> {
  let process: Process = serde_json::from_value(doc).unwrap();
  match strand_workflow::lock(process).unwrap() {
    Executable::Workflow(workflow) => workflow,
    Executable::Tool(_) => panic!("expected a workflow document"),
  }
}
