use serde::{Deserialize, Serialize};

use crate::process::Process;
use crate::requirement::Requirements;
use crate::source::OneOrMany;

/// A workflow step: one invocation of an embedded process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub id: String,
  #[serde(default)]
  pub inputs: Vec<StepInput>,
  /// Output keys the step publishes, referenced downstream as `"<id>/<key>"`.
  #[serde(default)]
  pub outputs: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scatter: Option<ScatterDef>,
  pub run: Process,
  #[serde(default)]
  pub requirements: Requirements,
}

/// An input port of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
  /// Input key, as seen by the embedded process.
  pub id: String,
  /// Parameter identifier(s) this port reads from.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<OneOrMany<String>>,
  /// Merge policy for multiple sources: `merge_nested` or `merge_flattened`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_merge: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,
  /// Expression applied to the port's value before the step runs.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value_from: Option<String>,
}

impl StepInput {
  /// Declared source identifiers (empty when the port has no source).
  pub fn sources(&self) -> &[String] {
    self.source.as_ref().map(|s| s.as_slice()).unwrap_or(&[])
  }
}

/// Scatter declaration of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterDef {
  /// Input keys to iterate over.
  pub keys: OneOrMany<String>,
  /// `dotproduct`, `nested_crossproduct` or `flat_crossproduct`. Optional
  /// when a single key is scattered.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
}
