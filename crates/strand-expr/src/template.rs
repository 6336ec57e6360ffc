use minijinja::Environment;
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::ExpressionError;
use crate::{Evaluator, is_expression};

/// Evaluator backed by minijinja.
pub struct TemplateEvaluator {
  env: Environment<'static>,
}

impl TemplateEvaluator {
  pub fn new() -> Self {
    Self {
      env: Environment::new(),
    }
  }
}

impl Default for TemplateEvaluator {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for TemplateEvaluator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TemplateEvaluator").finish_non_exhaustive()
  }
}

/// The inner expression when `template` is exactly one `{{ ... }}` block.
fn single_interpolation(template: &str) -> Option<&str> {
  let inner = template
    .trim()
    .strip_prefix("{{")?
    .strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") || inner.contains("{%") {
    return None;
  }
  Some(inner.trim())
}

impl Evaluator for TemplateEvaluator {
  fn evaluate(&self, expression: &str, context: &EvalContext) -> Result<Value, ExpressionError> {
    if !is_expression(expression) {
      return Ok(Value::String(expression.to_string()));
    }

    let ctx = minijinja::Value::from_serialize(context.to_value());
    let failed = |e: minijinja::Error| ExpressionError::Evaluation {
      expression: expression.to_string(),
      message: e.to_string(),
    };

    match single_interpolation(expression) {
      Some(inner) => {
        let compiled = self.env.compile_expression(inner).map_err(failed)?;
        let result = compiled.eval(ctx).map_err(failed)?;
        if result.is_undefined() {
          return Ok(Value::Null);
        }
        serde_json::to_value(&result).map_err(|e| ExpressionError::Conversion {
          expression: expression.to_string(),
          message: e.to_string(),
        })
      }
      None => self
        .env
        .render_str(expression, ctx)
        .map(Value::String)
        .map_err(failed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn ctx(inputs: Value) -> EvalContext {
    EvalContext::new(inputs.as_object().cloned().unwrap())
  }

  #[test]
  fn test_literal_passthrough() {
    let evaluator = TemplateEvaluator::new();
    let result = evaluator.evaluate("hello world", &EvalContext::default()).unwrap();
    assert_eq!(result, json!("hello world"));
  }

  #[test]
  fn test_single_interpolation_keeps_type() {
    let evaluator = TemplateEvaluator::new();
    let context = ctx(json!({ "size": 100, "items": [1, 2, 3] }));

    assert_eq!(
      evaluator.evaluate("{{ inputs.size * 2 }}", &context).unwrap(),
      json!(200)
    );
    assert_eq!(
      evaluator.evaluate("{{ inputs.items }}", &context).unwrap(),
      json!([1, 2, 3])
    );
    assert_eq!(
      evaluator.evaluate("  {{ inputs.items | length }} ", &context).unwrap(),
      json!(3)
    );
  }

  #[test]
  fn test_mixed_template_renders_string() {
    let evaluator = TemplateEvaluator::new();
    let context = ctx(json!({ "name": "Alice", "count": 5 }));

    let result = evaluator
      .evaluate("Hello {{ inputs.name }}, you have {{ inputs.count }} messages", &context)
      .unwrap();
    assert_eq!(result, json!("Hello Alice, you have 5 messages"));
  }

  #[test]
  fn test_value_and_globals() {
    let evaluator = TemplateEvaluator::new();
    let context = ctx(json!({ "suffix": "!" }))
      .with_value(json!("step"))
      .with_globals(json!({ "prefix": "wf-" }).as_object().cloned().unwrap());

    let result = evaluator
      .evaluate("{{ prefix ~ value ~ inputs.suffix }}", &context)
      .unwrap();
    assert_eq!(result, json!("wf-step!"));
  }

  #[test]
  fn test_runtime_resources() {
    let evaluator = TemplateEvaluator::new();
    let context = EvalContext::default().with_runtime(json!({ "cores": 4 }));

    assert_eq!(
      evaluator.evaluate("{{ runtime.cores }}", &context).unwrap(),
      json!(4)
    );
  }

  #[test]
  fn test_missing_value_is_null() {
    let evaluator = TemplateEvaluator::new();
    let result = evaluator
      .evaluate("{{ inputs.missing }}", &EvalContext::default())
      .unwrap();
    assert_eq!(result, Value::Null);
  }

  #[test]
  fn test_invalid_expression() {
    let evaluator = TemplateEvaluator::new();
    let result = evaluator.evaluate("{{ inputs. }}", &EvalContext::default());
    assert!(matches!(result, Err(ExpressionError::Evaluation { .. })));
  }

  #[test]
  fn test_filters() {
    let evaluator = TemplateEvaluator::new();
    let context = ctx(json!({ "name": "Test" }));

    assert_eq!(
      evaluator.evaluate("{{ inputs.name | upper }}", &context).unwrap(),
      json!("TEST")
    );
  }
}
