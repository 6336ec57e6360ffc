//! Expression evaluation for strand.
//!
//! Expressions appear in step `value_from` fields, tool commands and outputs,
//! and resource requirements. They are minijinja templates evaluated against
//! an [`EvalContext`]:
//!
//! ```json
//! { "value_from": "{{ inputs.prefix ~ value }}", "ram_min": "{{ inputs.size * 2 }}" }
//! ```
//!
//! A string with no `{{`/`{%` markers is not an expression and evaluates to
//! itself. A string that is exactly one `{{ ... }}` interpolation keeps the
//! type of its result; any other template renders to a string.

mod context;
mod error;
mod template;

pub use context::EvalContext;
pub use error::ExpressionError;
pub use template::TemplateEvaluator;

/// Capability to evaluate one expression against a context.
pub trait Evaluator: Send + Sync {
  fn evaluate(
    &self,
    expression: &str,
    context: &EvalContext,
  ) -> Result<serde_json::Value, ExpressionError>;
}

/// Whether a string contains template markers.
pub fn is_expression(s: &str) -> bool {
  s.contains("{{") || s.contains("{%")
}
