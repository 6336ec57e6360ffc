use serde::{Deserialize, Serialize};

use crate::requirement::Requirements;
use crate::source::OneOrMany;
use crate::step::StepDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub id: String,
  #[serde(default)]
  pub inputs: Vec<WorkflowInput>,
  #[serde(default)]
  pub outputs: Vec<WorkflowOutput>,
  #[serde(default)]
  pub steps: Vec<StepDef>,
  #[serde(default)]
  pub requirements: Requirements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutput {
  pub id: String,
  pub output_source: OneOrMany<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_merge: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Process;

  #[test]
  fn test_parse_nested_document() {
    let doc = serde_json::json!({
      "class": "workflow",
      "id": "main",
      "inputs": [{ "id": "xs" }, { "id": "n", "default": 3 }],
      "outputs": [{ "id": "all", "output_source": ["a/out", "b/out"], "link_merge": "merge_flattened" }],
      "steps": [
        {
          "id": "a",
          "inputs": [{ "id": "x", "source": "xs" }],
          "outputs": ["out"],
          "scatter": { "keys": "x" },
          "run": { "class": "tool", "id": "echo", "command": ["echo", "{{ inputs.x }}"] }
        },
        {
          "id": "b",
          "inputs": [{ "id": "n", "source": "n", "value_from": "{{ value + 1 }}" }],
          "outputs": ["out"],
          "run": { "class": "workflow", "id": "inner" }
        }
      ]
    });

    let process: Process = serde_json::from_value(doc).unwrap();
    let Process::Workflow(workflow) = process else {
      panic!("expected workflow");
    };

    assert_eq!(workflow.steps.len(), 2);
    assert_eq!(workflow.inputs[1].default, Some(serde_json::json!(3)));
    assert_eq!(workflow.outputs[0].output_source.len(), 2);
    assert_eq!(workflow.steps[0].scatter.as_ref().unwrap().keys.as_slice(), ["x"]);
    assert!(matches!(workflow.steps[0].run, Process::Tool(_)));
    assert!(matches!(workflow.steps[1].run, Process::Workflow(_)));
    assert_eq!(workflow.steps[1].inputs[0].sources(), ["n"]);
  }
}
