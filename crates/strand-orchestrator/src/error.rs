//! Orchestration errors.

use std::path::PathBuf;

use strand_engine::EngineError;
use strand_expr::ExpressionError;
use strand_tool::ToolError;

/// Errors that can occur while scheduling or running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  /// Scheduling stopped making progress with work left over.
  #[error(
    "workflow '{workflow_id}' cannot be scheduled: unscheduled steps [{}], unavailable sources [{}]",
    .unscheduled.join(", "),
    .missing.join(", ")
  )]
  GraphUnsatisfiable {
    workflow_id: String,
    unscheduled: Vec<String>,
    missing: Vec<String>,
  },

  /// A producer's result has no value under the promised key.
  #[error("result of {producer} has no output '{key}'")]
  MissingOutputKey { key: String, producer: String },

  /// Dotproduct scatter over lists of different lengths.
  #[error("step '{step_id}': scatter input '{key}' has {actual} element(s), expected {expected}")]
  ScatterShapeMismatch {
    step_id: String,
    key: String,
    expected: usize,
    actual: usize,
  },

  /// A scatter job was built for a step with no scatter keys.
  #[error("step '{step_id}' has no scatter keys")]
  EmptyScatter { step_id: String },

  /// A scattered input did not resolve to a list.
  #[error("step '{step_id}': scatter input '{key}' is not a list")]
  ScatterInputNotList { step_id: String, key: String },

  #[error(
    "step '{step_id}': unsupported scatter method '{}'",
    .method.as_deref().unwrap_or("(none)")
  )]
  UnsupportedScatterMethod {
    step_id: String,
    method: Option<String>,
  },

  #[error("unsupported link merge policy '{policy}'")]
  UnsupportedMergePolicy { policy: String },

  /// A resource field did not evaluate to a non-negative number.
  #[error("resource field '{field}' evaluated to {value}, expected a number")]
  InvalidResource { field: String, value: String },

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Expression(#[from] ExpressionError),

  #[error("engine error: {0}")]
  Engine(EngineError),

  /// A pending object could not be encoded into or decoded from a task result.
  #[error("failed to encode pending value: {0}")]
  Encoding(#[from] serde_json::Error),

  /// Output staging failed.
  #[error("failed to stage {}: {source}", path.display())]
  Staging {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl From<EngineError> for OrchestratorError {
  /// Job failures carrying an orchestration error are unwrapped so callers
  /// see the original variant.
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::TaskFailed {
        task_id,
        name,
        source,
      } => match source.downcast::<OrchestratorError>() {
        Ok(inner) => *inner,
        Err(source) => OrchestratorError::Engine(EngineError::TaskFailed {
          task_id,
          name,
          source,
        }),
      },
      other => OrchestratorError::Engine(other),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use strand_engine::TaskId;

  #[test]
  fn test_task_failure_is_unwrapped() {
    let err = EngineError::TaskFailed {
      task_id: TaskId::new(),
      name: "merge".to_string(),
      source: Box::new(OrchestratorError::UnsupportedMergePolicy {
        policy: "zip".to_string(),
      }),
    };

    let err = OrchestratorError::from(err);
    assert!(matches!(err, OrchestratorError::UnsupportedMergePolicy { policy } if policy == "zip"));
  }

  #[test]
  fn test_other_failures_are_kept() {
    let err = OrchestratorError::from(EngineError::Stalled { pending: 2 });
    assert!(matches!(err, OrchestratorError::Engine(EngineError::Stalled { pending: 2 })));
  }

  #[test]
  fn test_graph_unsatisfiable_message() {
    let err = OrchestratorError::GraphUnsatisfiable {
      workflow_id: "main".to_string(),
      unscheduled: vec!["a".to_string(), "b".to_string()],
      missing: vec!["ghost/out".to_string()],
    };
    assert_eq!(
      err.to_string(),
      "workflow 'main' cannot be scheduled: unscheduled steps [a, b], unavailable sources [ghost/out]"
    );
  }
}
