use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::EngineError;
use crate::graph::TaskGraph;
use crate::task::{Resources, TaskId, TaskOutput, TaskSpec};

/// Completed task results, shared between the engine and running jobs.
#[derive(Debug, Clone, Default)]
pub struct Results {
  inner: Arc<RwLock<HashMap<TaskId, TaskOutput>>>,
}

impl Results {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: TaskId) -> Option<TaskOutput> {
    let results = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    results.get(&id).cloned()
  }

  pub fn contains(&self, id: TaskId) -> bool {
    let results = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    results.contains_key(&id)
  }

  pub fn insert(&self, id: TaskId, output: TaskOutput) {
    let mut results = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    results.insert(id, output);
  }

  /// Whether `id` has completed and every promise reachable from its result
  /// has completed too.
  pub fn is_settled(&self, id: TaskId) -> bool {
    let mut seen = HashSet::new();
    self.settled_inner(id, &mut seen)
  }

  fn settled_inner(&self, id: TaskId, seen: &mut HashSet<TaskId>) -> bool {
    if !seen.insert(id) {
      return true;
    }
    match self.get(id) {
      Some(output) => output
        .promises()
        .into_iter()
        .all(|next| self.settled_inner(next, seen)),
      None => false,
    }
  }

  /// Collapse every promise in `output` into the value it points at.
  pub fn resolve(&self, output: &TaskOutput) -> Result<serde_json::Value, EngineError> {
    match output {
      TaskOutput::Value(value) => Ok(value.clone()),
      TaskOutput::Promise(id) => {
        let next = self
          .get(*id)
          .ok_or(EngineError::MissingResult { task_id: *id })?;
        self.resolve(&next)
      }
      TaskOutput::List(items) => items
        .iter()
        .map(|item| self.resolve(item))
        .collect::<Result<Vec<_>, _>>()
        .map(serde_json::Value::Array),
    }
  }
}

/// A running job's view of the engine.
///
/// Tasks and edges added here are staged and only become part of the run
/// once the job returns successfully.
#[derive(Debug)]
pub struct JobContext {
  current: TaskId,
  resources: Resources,
  staged: TaskGraph,
  results: Results,
}

impl JobContext {
  pub fn new(current: TaskId, resources: Resources, results: Results) -> Self {
    Self {
      current,
      resources,
      staged: TaskGraph::new(),
      results,
    }
  }

  /// A context for building a graph outside of any run.
  pub fn detached() -> Self {
    Self::new(TaskId::new(), Resources::default(), Results::new())
  }

  /// Id of the task this job is running as.
  pub fn current(&self) -> TaskId {
    self.current
  }

  /// Resources reserved for the current task.
  pub fn resources(&self) -> &Resources {
    &self.resources
  }

  pub fn add_task(&mut self, spec: TaskSpec) -> TaskId {
    self.staged.add_task(spec)
  }

  pub fn add_child(&mut self, parent: TaskId, child: TaskId) {
    self.staged.add_child(parent, child);
  }

  pub fn add_dependent(&mut self, producer: TaskId, consumer: TaskId) {
    self.staged.add_dependent(producer, consumer);
  }

  pub fn has_child(&self, parent: TaskId, child: TaskId) -> bool {
    self.staged.has_child(parent, child)
  }

  pub fn add_follow_on(&mut self, before: TaskId, after: TaskId) {
    self.staged.add_follow_on(before, after);
  }

  /// Raw result of a completed task.
  pub fn result(&self, id: TaskId) -> Result<TaskOutput, EngineError> {
    self
      .results
      .get(id)
      .ok_or(EngineError::MissingResult { task_id: id })
  }

  pub fn resolve(&self, output: &TaskOutput) -> Result<serde_json::Value, EngineError> {
    self.results.resolve(output)
  }

  pub fn results(&self) -> &Results {
    &self.results
  }

  /// Tasks and edges added so far.
  pub fn staged(&self) -> &TaskGraph {
    &self.staged
  }

  pub fn into_staged(self) -> TaskGraph {
    self.staged
  }
}
