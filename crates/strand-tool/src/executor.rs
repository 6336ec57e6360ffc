//! Tool executor implementation.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strand_expr::EvalContext;
use tokio::process::Command;
use tracing::{error, info, instrument};

use crate::error::ToolError;
use crate::invocation::ToolInvocation;

/// Capability to run a single leaf tool over concrete inputs.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
  async fn execute(&self, invocation: &ToolInvocation) -> Result<Map<String, Value>, ToolError>;
}

/// Configuration for local tool execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  /// Each task gets its own directory below this one.
  pub work_dir: PathBuf,
}

impl ExecutorConfig {
  pub fn task_dir(&self, task_id: &str) -> PathBuf {
    self.work_dir.join(task_id)
  }
}

/// Runs a tool's command as a local process.
///
/// Every `command` element is evaluated against the inputs; the first is the
/// program. Outputs are evaluated afterwards with `stdout` and `exit_code`
/// in scope. A tool without a command only evaluates its outputs.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
  pub fn new() -> Self {
    Self
  }

  fn context(&self, invocation: &ToolInvocation) -> EvalContext {
    let runtime = serde_json::to_value(&invocation.runtime).unwrap_or(Value::Null);
    EvalContext::new(invocation.inputs.clone())
      .with_runtime(runtime)
      .with_globals(invocation.tool.requirements.globals.clone())
  }

  fn evaluate(
    &self,
    invocation: &ToolInvocation,
    expression: &str,
    ctx: &EvalContext,
  ) -> Result<Value, ToolError> {
    invocation
      .evaluator
      .evaluate(expression, ctx)
      .map_err(|source| ToolError::Expression {
        tool_id: invocation.tool.id.clone(),
        source,
      })
  }

  async fn run_command(
    &self,
    invocation: &ToolInvocation,
    ctx: &EvalContext,
  ) -> Result<(String, i32), ToolError> {
    let tool_id = &invocation.tool.id;

    let mut argv = Vec::with_capacity(invocation.tool.command.len());
    for element in &invocation.tool.command {
      let value = self.evaluate(invocation, element, ctx)?;
      argv.push(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
      });
    }

    let Some((program, args)) = argv.split_first().filter(|(p, _)| !p.is_empty()) else {
      return Err(ToolError::EmptyProgram {
        tool_id: tool_id.clone(),
      });
    };

    info!(program = %program, args = ?args, "command_started");

    let output = Command::new(program)
      .args(args)
      .current_dir(invocation.outdir())
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| ToolError::Spawn {
        tool_id: tool_id.clone(),
        message: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(ToolError::Failed {
        tool_id: tool_id.clone(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok((stdout, output.status.code().unwrap_or_default()))
  }

  async fn execute_inner(
    &self,
    invocation: &ToolInvocation,
  ) -> Result<Map<String, Value>, ToolError> {
    let outdir = invocation.outdir();
    tokio::fs::create_dir_all(outdir)
      .await
      .map_err(|source| ToolError::OutputDir {
        path: outdir.clone(),
        source,
      })?;

    let ctx = self.context(invocation);

    let (stdout, exit_code) = if invocation.tool.command.is_empty() {
      (String::new(), 0)
    } else {
      self.run_command(invocation, &ctx).await?
    };

    let mut output_ctx = ctx;
    output_ctx
      .globals
      .insert("stdout".to_string(), Value::String(stdout));
    output_ctx
      .globals
      .insert("exit_code".to_string(), Value::from(exit_code));

    let mut outputs = Map::new();
    for output in &invocation.tool.outputs {
      let value = match &output.value {
        Some(expression) => self.evaluate(invocation, expression, &output_ctx)?,
        None => Value::Null,
      };
      outputs.insert(output.id.clone(), value);
    }

    Ok(outputs)
  }
}

#[async_trait]
impl ToolExecutor for CommandExecutor {
  #[instrument(
    name = "tool_execute",
    skip(self, invocation),
    fields(
      task_id = %invocation.task_id,
      tool_id = %invocation.tool.id,
    )
  )]
  async fn execute(&self, invocation: &ToolInvocation) -> Result<Map<String, Value>, ToolError> {
    info!(inputs = ?invocation.inputs, "tool started");

    let result = self.execute_inner(invocation).await;

    match &result {
      Ok(outputs) => info!(outputs = ?outputs, "tool completed"),
      Err(e) => error!(error = %e, "tool failed"),
    }

    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::invocation::Runtime;
  use serde_json::json;
  use std::sync::Arc;
  use strand_config::ToolDef;
  use strand_expr::TemplateEvaluator;

  fn invocation(tool: Value, inputs: Value, outdir: PathBuf) -> ToolInvocation {
    let tool: ToolDef = serde_json::from_value(tool).unwrap();
    ToolInvocation {
      task_id: "task-1".to_string(),
      tool: Arc::new(tool),
      inputs: inputs.as_object().cloned().unwrap(),
      runtime: Runtime {
        cores: 1.0,
        memory: 1024,
        disk: 0,
        outdir,
      },
      evaluator: Arc::new(TemplateEvaluator::new()),
    }
  }

  #[tokio::test]
  async fn test_expression_tool() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({
        "id": "double",
        "inputs": [{ "id": "x" }],
        "outputs": [
          { "id": "out", "value": "{{ inputs.x * 2 }}" },
          { "id": "unset" }
        ]
      }),
      json!({ "x": 21 }),
      dir.path().join("out"),
    );

    let outputs = CommandExecutor::new().execute(&inv).await.unwrap();

    assert_eq!(outputs["out"], 42);
    assert_eq!(outputs["unset"], Value::Null);
    assert!(dir.path().join("out").is_dir());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_command_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({
        "id": "echo",
        "command": ["echo", "{{ inputs.message }}"],
        "outputs": [
          { "id": "text", "value": "{{ stdout | trim }}" },
          { "id": "code", "value": "{{ exit_code }}" }
        ]
      }),
      json!({ "message": "hello" }),
      dir.path().to_path_buf(),
    );

    let outputs = CommandExecutor::new().execute(&inv).await.unwrap();

    assert_eq!(outputs["text"], "hello");
    assert_eq!(outputs["code"], 0);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_command_runs_in_outdir() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({
        "id": "touch",
        "command": ["touch", "created.txt"],
        "outputs": []
      }),
      json!({}),
      dir.path().to_path_buf(),
    );

    CommandExecutor::new().execute(&inv).await.unwrap();
    assert!(dir.path().join("created.txt").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_nonzero_exit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({ "id": "fail", "command": ["false"] }),
      json!({}),
      dir.path().to_path_buf(),
    );

    let err = CommandExecutor::new().execute(&inv).await.unwrap_err();
    assert!(matches!(err, ToolError::Failed { tool_id, .. } if tool_id == "fail"));
  }

  #[tokio::test]
  async fn test_missing_program() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({ "id": "ghost", "command": ["definitely-not-a-real-program-xyz"] }),
      json!({}),
      dir.path().to_path_buf(),
    );

    let err = CommandExecutor::new().execute(&inv).await.unwrap_err();
    assert!(matches!(err, ToolError::Spawn { .. }));
  }

  #[tokio::test]
  async fn test_empty_program() {
    let dir = tempfile::tempdir().unwrap();
    let inv = invocation(
      json!({ "id": "blank", "command": ["{{ inputs.missing }}"] }),
      json!({}),
      dir.path().to_path_buf(),
    );

    let err = CommandExecutor::new().execute(&inv).await.unwrap_err();
    assert!(matches!(err, ToolError::EmptyProgram { .. }));
  }
}
