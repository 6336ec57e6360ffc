use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use strand_config::ToolDef;
use strand_expr::Evaluator;

/// Resources granted to a running tool, visible to expressions as `runtime`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Runtime {
  pub cores: f64,
  /// Bytes.
  pub memory: u64,
  /// Bytes.
  pub disk: u64,
  pub outdir: PathBuf,
}

/// Everything needed to execute one tool once.
#[derive(Clone)]
pub struct ToolInvocation {
  /// Engine task id, used for logging and the working directory name.
  pub task_id: String,
  pub tool: Arc<ToolDef>,
  /// Concrete inputs, defaults already filled in.
  pub inputs: Map<String, Value>,
  pub runtime: Runtime,
  pub evaluator: Arc<dyn Evaluator>,
}

impl ToolInvocation {
  pub fn outdir(&self) -> &PathBuf {
    &self.runtime.outdir
  }
}

impl std::fmt::Debug for ToolInvocation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ToolInvocation")
      .field("task_id", &self.task_id)
      .field("tool", &self.tool.id)
      .field("inputs", &self.inputs)
      .field("runtime", &self.runtime)
      .finish_non_exhaustive()
  }
}

/// Fill declared input defaults for keys that are absent or null.
pub fn fill_in_defaults(tool: &ToolDef, inputs: &mut Map<String, Value>) {
  for input in &tool.inputs {
    let Some(default) = &input.default else {
      continue;
    };
    let missing = inputs.get(&input.id).is_none_or(Value::is_null);
    if missing {
      inputs.insert(input.id.clone(), default.clone());
    }
  }
}
