//! Promises: forward references to values a task will produce.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strand_engine::{JobContext, TaskId};

use crate::error::OrchestratorError;

/// Where a promised value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Producer {
  /// The result mapping of an engine task.
  Task(TaskId),
  /// The input snapshot of the running workflow.
  Inputs(Arc<Map<String, Value>>),
}

/// The value a producer yields under `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promise {
  pub key: String,
  pub producer: Producer,
}

impl Promise {
  pub fn new(key: impl Into<String>, producer: Producer) -> Self {
    Self {
      key: key.into(),
      producer,
    }
  }

  /// Read the promised value. Only valid once the producer has completed.
  ///
  /// An input the workflow was not given reads as `null`; a key missing from
  /// a task's result is an error.
  pub fn resolve(&self, ctx: &JobContext) -> Result<Value, OrchestratorError> {
    match &self.producer {
      Producer::Inputs(inputs) => Ok(inputs.get(&self.key).cloned().unwrap_or(Value::Null)),
      Producer::Task(id) => {
        let result = ctx.resolve(&ctx.result(*id)?)?;
        result
          .as_object()
          .and_then(|map| map.get(&self.key))
          .cloned()
          .ok_or_else(|| OrchestratorError::MissingOutputKey {
            key: self.key.clone(),
            producer: format!("task {id}"),
          })
      }
    }
  }
}

/// Parameter identifier to the promise that yields it, for one workflow
/// scheduling run.
///
/// Each promise carries the exact key its producer writes, so identifiers
/// containing `/` or `#` never need to be split apart again. Entries are only
/// ever added.
#[derive(Debug, Clone, Default)]
pub struct PromiseMap {
  promises: HashMap<String, Promise>,
}

impl PromiseMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record the promise for `parameter`. Returns false if it was already known.
  pub fn insert(&mut self, parameter: impl Into<String>, promise: Promise) -> bool {
    let parameter = parameter.into();
    if self.promises.contains_key(&parameter) {
      return false;
    }
    self.promises.insert(parameter, promise);
    true
  }

  pub fn contains(&self, parameter: &str) -> bool {
    self.promises.contains_key(parameter)
  }

  pub fn producer(&self, parameter: &str) -> Option<&Producer> {
    self.promises.get(parameter).map(|promise| &promise.producer)
  }

  pub fn promise(&self, parameter: &str) -> Option<Promise> {
    self.promises.get(parameter).cloned()
  }

  pub fn len(&self) -> usize {
    self.promises.len()
  }

  pub fn is_empty(&self) -> bool {
    self.promises.is_empty()
  }
}
