use std::collections::{HashMap, HashSet, VecDeque};

use crate::task::{TaskId, TaskSpec};

/// Tasks and their dependency edges.
///
/// Edges may name tasks that live in another graph; a job's staged graph
/// routinely hangs new tasks under tasks the run already knows about.
#[derive(Debug, Default, Clone)]
pub struct TaskGraph {
  tasks: HashMap<TaskId, TaskSpec>,
  /// Insertion order, so runs are deterministic.
  order: Vec<TaskId>,
  children: HashMap<TaskId, Vec<TaskId>>,
  parents: HashMap<TaskId, Vec<TaskId>>,
  /// Parents whose result must settle before the child runs.
  producers: HashMap<TaskId, Vec<TaskId>>,
  follow_ons: HashMap<TaskId, Vec<TaskId>>,
  predecessors: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_task(&mut self, spec: TaskSpec) -> TaskId {
    let id = TaskId::new();
    self.tasks.insert(id, spec);
    self.order.push(id);
    id
  }

  /// Run `child` once `parent` has completed. Duplicate edges are ignored.
  pub fn add_child(&mut self, parent: TaskId, child: TaskId) {
    if self.has_child(parent, child) {
      return;
    }
    self.children.entry(parent).or_default().push(child);
    self.parents.entry(child).or_default().push(parent);
  }

  /// Like [`add_child`](Self::add_child), but `consumer` also waits for
  /// every promise in the producer's result to complete.
  pub fn add_dependent(&mut self, producer: TaskId, consumer: TaskId) {
    self.add_child(producer, consumer);
    let producers = self.producers.entry(consumer).or_default();
    if !producers.contains(&producer) {
      producers.push(producer);
    }
  }

  pub fn has_child(&self, parent: TaskId, child: TaskId) -> bool {
    self
      .children
      .get(&parent)
      .is_some_and(|children| children.contains(&child))
  }

  /// Make `after` wait for `before` and everything below it.
  pub fn add_follow_on(&mut self, before: TaskId, after: TaskId) {
    let follow_ons = self.follow_ons.entry(before).or_default();
    if follow_ons.contains(&after) {
      return;
    }
    follow_ons.push(after);
    self.predecessors.entry(after).or_default().push(before);
  }

  pub fn get(&self, id: TaskId) -> Option<&TaskSpec> {
    self.tasks.get(&id)
  }

  pub fn contains(&self, id: TaskId) -> bool {
    self.tasks.contains_key(&id)
  }

  /// Task ids in insertion order.
  pub fn task_ids(&self) -> &[TaskId] {
    &self.order
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn children(&self, id: TaskId) -> &[TaskId] {
    self.children.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn parents(&self, id: TaskId) -> &[TaskId] {
    self.parents.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn producers(&self, id: TaskId) -> &[TaskId] {
    self.producers.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn follow_ons(&self, id: TaskId) -> &[TaskId] {
    self.follow_ons.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn predecessors(&self, id: TaskId) -> &[TaskId] {
    self
      .predecessors
      .get(&id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every task below `id`: its children, and transitively their children
  /// and follow-ons. The follow-ons of `id` itself are not included.
  pub fn descendants(&self, id: TaskId) -> HashSet<TaskId> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<TaskId> = self.children(id).iter().copied().collect();

    while let Some(next) = queue.pop_front() {
      if !seen.insert(next) {
        continue;
      }
      queue.extend(self.children(next));
      queue.extend(self.follow_ons(next));
    }

    seen
  }

  /// Absorb another graph's tasks and edges.
  pub fn merge(&mut self, other: TaskGraph) {
    let TaskGraph {
      mut tasks,
      order,
      children,
      producers,
      follow_ons,
      ..
    } = other;

    for id in order {
      if let Some(spec) = tasks.remove(&id) {
        self.tasks.insert(id, spec);
        self.order.push(id);
      }
    }
    for (parent, kids) in children {
      for child in kids {
        self.add_child(parent, child);
      }
    }
    for (consumer, from) in producers {
      for producer in from {
        self.add_dependent(producer, consumer);
      }
    }
    for (before, afters) in follow_ons {
      for after in afters {
        self.add_follow_on(before, after);
      }
    }
  }
}
