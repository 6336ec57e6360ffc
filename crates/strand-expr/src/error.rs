use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpressionError {
  /// The expression failed to compile or evaluate.
  #[error("failed to evaluate '{expression}': {message}")]
  Evaluation { expression: String, message: String },

  /// The result could not be represented as JSON.
  #[error("expression '{expression}' produced an unrepresentable value: {message}")]
  Conversion { expression: String, message: String },
}
