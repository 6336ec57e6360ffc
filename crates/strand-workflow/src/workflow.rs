use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strand_config::{Requirements, ScatterDef, StepInput, ToolDef, WorkflowInput, WorkflowOutput};

use crate::graph::Graph;

/// A locked executable unit.
///
/// Closed over the two kinds of process a step can embed, so task
/// construction dispatches with a `match` rather than inspecting documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Executable {
  Tool(Arc<ToolDef>),
  Workflow(Arc<Workflow>),
}

impl Executable {
  pub fn id(&self) -> &str {
    match self {
      Executable::Tool(tool) => &tool.id,
      Executable::Workflow(workflow) => &workflow.id,
    }
  }
}

/// A locked workflow ready for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub id: String,
  pub inputs: Vec<WorkflowInput>,
  pub outputs: Vec<WorkflowOutput>,
  pub steps: Vec<Arc<Step>>,
  /// Effective requirements (own values over inherited ones).
  pub requirements: Requirements,
}

impl Workflow {
  /// Build the step dependency graph.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.steps)
  }

  /// Get a step by id.
  pub fn get_step(&self, step_id: &str) -> Option<&Arc<Step>> {
    self.steps.iter().find(|step| step.id == step_id)
  }
}

/// A locked workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub id: String,
  pub inputs: Vec<StepInput>,
  pub outputs: Vec<String>,
  pub scatter: Option<ScatterDef>,
  pub run: Executable,
  /// Effective requirements, used when evaluating step-level `value_from`.
  pub requirements: Requirements,
}

impl Step {
  /// Parameter identifier under which the step publishes an output key.
  pub fn output_id(&self, key: &str) -> String {
    format!("{}/{}", self.id, key)
  }

  /// Scatter keys, empty when the step is not scattered.
  pub fn scatter_keys(&self) -> &[String] {
    self
      .scatter
      .as_ref()
      .map(|scatter| scatter.keys.as_slice())
      .unwrap_or(&[])
  }

  pub fn is_scattered(&self) -> bool {
    self.scatter.is_some()
  }

  /// Every source identifier the step reads from, in port order.
  pub fn sources(&self) -> impl Iterator<Item = &String> {
    self.inputs.iter().flat_map(|input| input.sources())
  }
}
