use serde::{Deserialize, Serialize};

use crate::requirement::Requirements;
use crate::workflow::WorkflowDef;

/// An executable unit: either a leaf tool or a nested workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Process {
  Tool(ToolDef),
  Workflow(WorkflowDef),
}

impl Process {
  pub fn id(&self) -> &str {
    match self {
      Process::Tool(tool) => &tool.id,
      Process::Workflow(workflow) => &workflow.id,
    }
  }

  pub fn requirements(&self) -> &Requirements {
    match self {
      Process::Tool(tool) => &tool.requirements,
      Process::Workflow(workflow) => &workflow.requirements,
    }
  }
}

/// A leaf tool: runs a command (or only evaluates expressions) over concrete
/// inputs and returns an output mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
  pub id: String,
  #[serde(default)]
  pub inputs: Vec<ToolInput>,
  #[serde(default)]
  pub outputs: Vec<ToolOutput>,
  /// Command line, one template per argument. Empty for expression-only tools.
  #[serde(default)]
  pub command: Vec<String>,
  #[serde(default)]
  pub requirements: Requirements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
  pub id: String,
  /// Expression over `inputs`, `stdout`, `exit_code` and `runtime`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
}
