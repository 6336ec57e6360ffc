use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::JobContext;
use crate::error::BoxError;

/// Identifier of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
  pub fn new() -> Self {
    Self(uuid::Uuid::new_v4())
  }
}

impl Default for TaskId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// What a job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutput {
  /// A concrete value.
  Value(serde_json::Value),
  /// The (eventual) result of another task.
  Promise(TaskId),
  /// An ordered collection, possibly nested.
  List(Vec<TaskOutput>),
}

impl TaskOutput {
  /// Visit every task this output points at, at any depth.
  pub fn promises(&self) -> Vec<TaskId> {
    let mut ids = Vec::new();
    self.collect_promises(&mut ids);
    ids
  }

  fn collect_promises(&self, ids: &mut Vec<TaskId>) {
    match self {
      TaskOutput::Value(_) => {}
      TaskOutput::Promise(id) => ids.push(*id),
      TaskOutput::List(items) => items.iter().for_each(|item| item.collect_promises(ids)),
    }
  }
}

impl From<serde_json::Value> for TaskOutput {
  fn from(value: serde_json::Value) -> Self {
    TaskOutput::Value(value)
  }
}

/// Resource reservation for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
  pub cores: f64,
  /// Bytes.
  pub memory: u64,
  /// Bytes.
  pub disk: u64,
}

impl Resources {
  pub fn new(cores: f64, memory: u64, disk: u64) -> Self {
    Self {
      cores,
      memory,
      disk,
    }
  }
}

impl Default for Resources {
  fn default() -> Self {
    Self::new(1.0, 0, 0)
  }
}

/// The kind of work a job does, for logging and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
  Orchestrate,
  LeafExecute,
  IndirectResolve,
  ScatterExpand,
  GatherCollect,
  DeferredWrap,
}

impl fmt::Display for JobKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      JobKind::Orchestrate => "orchestrate",
      JobKind::LeafExecute => "leaf_execute",
      JobKind::IndirectResolve => "indirect_resolve",
      JobKind::ScatterExpand => "scatter_expand",
      JobKind::GatherCollect => "gather_collect",
      JobKind::DeferredWrap => "deferred_wrap",
    };
    f.write_str(s)
  }
}

/// A unit of work the engine can run.
///
/// `run` is called once, after every dependency of the task is satisfied.
#[async_trait]
pub trait Job: Send + Sync + fmt::Debug {
  fn kind(&self) -> JobKind;

  /// Human readable name (usually the step or tool id).
  fn name(&self) -> String;

  async fn run(&self, ctx: &mut JobContext) -> Result<TaskOutput, BoxError>;
}

/// A job together with its resource reservation.
#[derive(Debug, Clone)]
pub struct TaskSpec {
  pub job: Arc<dyn Job>,
  pub resources: Resources,
}

impl TaskSpec {
  pub fn new(job: Arc<dyn Job>, resources: Resources) -> Self {
    Self { job, resources }
  }
}
