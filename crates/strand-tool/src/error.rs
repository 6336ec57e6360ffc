//! Tool execution errors.

use std::path::PathBuf;

use strand_expr::ExpressionError;

/// Errors that can occur while executing a leaf tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
  /// Failed to prepare the output directory.
  #[error("failed to create output directory {}: {source}", path.display())]
  OutputDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A command element or output expression failed to evaluate.
  #[error("expression failed in tool '{tool_id}': {source}")]
  Expression {
    tool_id: String,
    #[source]
    source: ExpressionError,
  },

  /// The command evaluated to an empty program name.
  #[error("tool '{tool_id}' has an empty program")]
  EmptyProgram { tool_id: String },

  /// The process could not be started.
  #[error("failed to start tool '{tool_id}': {message}")]
  Spawn { tool_id: String, message: String },

  /// The process exited unsuccessfully.
  #[error("tool '{tool_id}' exited with status {status}: {stderr}")]
  Failed {
    tool_id: String,
    status: String,
    stderr: String,
  },
}
