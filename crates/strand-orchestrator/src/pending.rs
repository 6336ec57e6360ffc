//! Pending input objects and their resolution.
//!
//! A step's input object is built at scheduling time, when most values only
//! exist as promises, and resolved inside the consuming task once every
//! producer has completed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strand_engine::JobContext;
use strand_expr::{EvalContext, Evaluator};
use strand_workflow::Requirements;

use crate::error::OrchestratorError;
use crate::promise::Promise;

/// How several sources feeding one input are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMerge {
  /// One list entry per source, in source order.
  MergeNested,
  /// List-valued sources are spliced in, anything else is appended.
  MergeFlattened,
}

impl LinkMerge {
  /// Parse a document policy; none means `merge_nested`.
  pub fn parse(policy: Option<&str>) -> Result<Self, OrchestratorError> {
    match policy {
      None | Some("merge_nested") => Ok(LinkMerge::MergeNested),
      Some("merge_flattened") => Ok(LinkMerge::MergeFlattened),
      Some(other) => Err(OrchestratorError::UnsupportedMergePolicy {
        policy: other.to_string(),
      }),
    }
  }

  /// Combine already-resolved source values.
  pub fn apply(self, values: Vec<Value>) -> Value {
    match self {
      LinkMerge::MergeNested => Value::Array(values),
      LinkMerge::MergeFlattened => {
        let mut merged = Vec::with_capacity(values.len());
        for value in values {
          match value {
            Value::Array(items) => merged.extend(items),
            other => merged.push(other),
          }
        }
        Value::Array(merged)
      }
    }
  }
}

/// Several promised sources combined under a merge policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSpec {
  pub sources: Vec<Promise>,
  pub policy: LinkMerge,
}

impl MergeSpec {
  pub fn resolve(&self, ctx: &JobContext) -> Result<Value, OrchestratorError> {
    let values = self
      .sources
      .iter()
      .map(|promise| promise.resolve(ctx))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(self.policy.apply(values))
  }
}

/// An expression applied to a value once all sibling inputs are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredExpression {
  pub expression: String,
  /// The value the expression sees as `value`.
  pub underlying: Box<PendingValue>,
  pub requirements: Arc<Requirements>,
}

/// One entry of a pending input object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingValue {
  Literal(Value),
  Promise(Promise),
  Merge(MergeSpec),
  Deferred(DeferredExpression),
}

impl PendingValue {
  /// Resolve everything except expressions. A deferred entry yields its
  /// underlying value.
  fn resolve_underlying(&self, ctx: &JobContext) -> Result<Value, OrchestratorError> {
    match self {
      PendingValue::Literal(value) => Ok(value.clone()),
      PendingValue::Promise(promise) => promise.resolve(ctx),
      PendingValue::Merge(merge) => merge.resolve(ctx),
      PendingValue::Deferred(deferred) => deferred.underlying.resolve_underlying(ctx),
    }
  }
}

/// Input key to pending value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingInput(BTreeMap<String, PendingValue>);

impl PendingInput {
  pub fn new() -> Self {
    Self::default()
  }

  /// An input object that is already fully concrete.
  pub fn from_literals(values: Map<String, Value>) -> Self {
    Self(
      values
        .into_iter()
        .map(|(key, value)| (key, PendingValue::Literal(value)))
        .collect(),
    )
  }

  pub fn insert(&mut self, key: impl Into<String>, value: PendingValue) {
    self.0.insert(key.into(), value);
  }

  pub fn get(&self, key: &str) -> Option<&PendingValue> {
    self.0.get(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &PendingValue)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Resolve into concrete values.
  ///
  /// Runs in two phases: every entry is first resolved without its
  /// expression, then each expression is evaluated with the phase-one
  /// mapping as `inputs` and its own underlying value as `value`.
  pub fn resolve(
    &self,
    ctx: &JobContext,
    evaluator: &dyn Evaluator,
  ) -> Result<Map<String, Value>, OrchestratorError> {
    let mut resolved = Map::new();
    for (key, value) in &self.0 {
      resolved.insert(key.clone(), value.resolve_underlying(ctx)?);
    }

    let deferred: Vec<_> = self
      .0
      .iter()
      .filter_map(|(key, value)| match value {
        PendingValue::Deferred(deferred) => Some((key, deferred)),
        _ => None,
      })
      .collect();

    if deferred.is_empty() {
      return Ok(resolved);
    }

    let mut evaluated = resolved.clone();
    for (key, deferred) in deferred {
      let context = EvalContext::new(resolved.clone())
        .with_value(resolved.get(key).cloned().unwrap_or(Value::Null))
        .with_globals(deferred.requirements.globals.clone());
      let value = evaluator.evaluate(&deferred.expression, &context)?;
      evaluated.insert(key.clone(), value);
    }

    Ok(evaluated)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::promise::Producer;
  use serde_json::json;
  use strand_engine::{Resources, Results, TaskId, TaskOutput};
  use strand_expr::TemplateEvaluator;

  fn ctx_with(results: &[(TaskId, Value)]) -> JobContext {
    let store = Results::new();
    for (id, value) in results {
      store.insert(*id, TaskOutput::Value(value.clone()));
    }
    JobContext::new(TaskId::new(), Resources::default(), store)
  }

  fn merge(policy: LinkMerge, a: TaskId, b: TaskId) -> PendingValue {
    PendingValue::Merge(MergeSpec {
      sources: vec![
        Promise::new("out", Producer::Task(a)),
        Promise::new("out", Producer::Task(b)),
      ],
      policy,
    })
  }

  #[test]
  fn test_link_merge_parse() {
    assert_eq!(LinkMerge::parse(None).unwrap(), LinkMerge::MergeNested);
    assert_eq!(
      LinkMerge::parse(Some("merge_flattened")).unwrap(),
      LinkMerge::MergeFlattened
    );
    assert!(matches!(
      LinkMerge::parse(Some("zip")),
      Err(OrchestratorError::UnsupportedMergePolicy { policy }) if policy == "zip"
    ));
  }

  #[test]
  fn test_merge_flattened_and_nested() {
    let a = TaskId::new();
    let b = TaskId::new();
    let ctx = ctx_with(&[(a, json!({ "out": [1, 2] })), (b, json!({ "out": 3 }))]);
    let evaluator = TemplateEvaluator::new();

    let mut pending = PendingInput::new();
    pending.insert("flat", merge(LinkMerge::MergeFlattened, a, b));
    pending.insert("nested", merge(LinkMerge::MergeNested, a, b));

    let resolved = pending.resolve(&ctx, &evaluator).unwrap();
    assert_eq!(resolved["flat"], json!([1, 2, 3]));
    assert_eq!(resolved["nested"], json!([[1, 2], 3]));
  }

  #[test]
  fn test_flattened_keeps_nested_lists_one_level() {
    let merged = LinkMerge::MergeFlattened.apply(vec![json!([[1], 2]), json!("x")]);
    assert_eq!(merged, json!([[1], 2, "x"]));
  }

  #[test]
  fn test_deferred_sees_resolved_siblings() {
    let a = TaskId::new();
    let b = TaskId::new();
    let ctx = ctx_with(&[(a, json!({ "out": [1, 2] })), (b, json!({ "out": 3 }))]);
    let evaluator = TemplateEvaluator::new();

    let mut pending = PendingInput::new();
    pending.insert("items", merge(LinkMerge::MergeFlattened, a, b));
    pending.insert(
      "count",
      PendingValue::Deferred(DeferredExpression {
        expression: "{{ inputs['items'] | length }}".to_string(),
        underlying: Box::new(PendingValue::Literal(Value::Null)),
        requirements: Arc::new(Requirements::default()),
      }),
    );
    pending.insert(
      "label",
      PendingValue::Deferred(DeferredExpression {
        expression: "{{ prefix ~ value }}".to_string(),
        underlying: Box::new(PendingValue::Promise(Promise::new("out", Producer::Task(b)))),
        requirements: Arc::new(Requirements {
          resources: None,
          globals: json!({ "prefix": "n=" }).as_object().cloned().unwrap(),
        }),
      }),
    );

    let resolved = pending.resolve(&ctx, &evaluator).unwrap();
    assert_eq!(resolved["items"], json!([1, 2, 3]));
    assert_eq!(resolved["count"], json!(3));
    assert_eq!(resolved["label"], json!("n=3"));
  }

  #[test]
  fn test_resolving_concrete_input_is_identity() {
    let values = json!({ "a": 1, "b": [true, null], "c": { "d": "e" } })
      .as_object()
      .cloned()
      .unwrap();
    let pending = PendingInput::from_literals(values.clone());

    let resolved = pending
      .resolve(&JobContext::detached(), &TemplateEvaluator::new())
      .unwrap();
    assert_eq!(resolved, values);

    let again = PendingInput::from_literals(resolved)
      .resolve(&JobContext::detached(), &TemplateEvaluator::new())
      .unwrap();
    assert_eq!(again, values);
  }

  #[test]
  fn test_serde_round_trip_through_task_result() {
    let mut pending = PendingInput::new();
    pending.insert("x", PendingValue::Literal(json!(1)));
    pending.insert(
      "y",
      PendingValue::Promise(Promise::new("out", Producer::Task(TaskId::new()))),
    );

    let encoded = serde_json::to_value(&pending).unwrap();
    let decoded: PendingInput = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, pending);
  }
}
