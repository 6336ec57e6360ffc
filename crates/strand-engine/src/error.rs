use crate::task::TaskId;

/// Error type returned by jobs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while running a task graph.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// A job returned an error. The run stops without starting new tasks.
  #[error("task '{name}' ({task_id}) failed: {source}")]
  TaskFailed {
    task_id: TaskId,
    name: String,
    #[source]
    source: BoxError,
  },

  /// Tasks remain but none can become runnable.
  #[error("run stalled with {pending} pending task(s)")]
  Stalled { pending: usize },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  /// A result was read before its task completed.
  #[error("result of task {task_id} is not available")]
  MissingResult { task_id: TaskId },

  /// An edge or result request named a task outside the graph.
  #[error("task {task_id} is not part of the graph")]
  UnknownTask { task_id: TaskId },

  /// A spawned job panicked or was aborted.
  #[error("task join error: {message}")]
  Join { message: String },
}

impl EngineError {
  /// Downcast the error a failed job returned.
  pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
    match self {
      EngineError::TaskFailed { source, .. } => source.downcast_ref::<E>(),
      _ => None,
    }
  }
}
