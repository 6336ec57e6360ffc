use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::workflow::Step;

/// Step-level dependency graph for inspection and analysis.
///
/// Edges run from the step producing a parameter to every step reading it.
/// Sources that name workflow inputs (or nothing at all) contribute no edge.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: step_id -> list of downstream step_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step_id -> list of upstream step_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Parameter identifier -> producing step id.
  producers: HashMap<String, String>,
  /// Steps with no upstream step, in document order.
  entry_points: Vec<String>,
  /// Steps fed by more than one upstream step.
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a graph from the steps of a workflow.
  pub fn new(steps: &[Arc<Step>]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut producers = HashMap::new();

    for step in steps {
      adjacency.entry(step.id.clone()).or_default();
      reverse_adjacency.entry(step.id.clone()).or_default();
      for key in &step.outputs {
        producers.insert(step.output_id(key), step.id.clone());
      }
    }

    for step in steps {
      for source in step.sources() {
        let Some(upstream) = producers.get(source) else {
          continue;
        };
        let upstream_of_step = reverse_adjacency.entry(step.id.clone()).or_default();
        if upstream_of_step.contains(upstream) {
          continue;
        }
        upstream_of_step.push(upstream.clone());
        adjacency
          .entry(upstream.clone())
          .or_default()
          .push(step.id.clone());
      }
    }

    let entry_points: Vec<String> = steps
      .iter()
      .filter(|step| reverse_adjacency.get(&step.id).is_none_or(|v| v.is_empty()))
      .map(|step| step.id.clone())
      .collect();

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      producers,
      entry_points,
      join_points,
    }
  }

  /// Get entry points (steps with no upstream step).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get downstream steps for a given step.
  pub fn downstream(&self, step_id: &str) -> &[String] {
    self
      .adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream steps for a given step.
  pub fn upstream(&self, step_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Step producing a parameter identifier, if any step does.
  pub fn producer(&self, parameter_id: &str) -> Option<&str> {
    self.producers.get(parameter_id).map(String::as_str)
  }

  /// Check if a step reads from more than one upstream step.
  pub fn is_join_point(&self, step_id: &str) -> bool {
    self.join_points.contains(step_id)
  }

  /// Get all join points.
  pub fn join_points(&self) -> &HashSet<String> {
    &self.join_points
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lock;
  use crate::workflow::Executable;
  use strand_config::Process;

  fn diamond() -> Arc<crate::Workflow> {
    let doc = serde_json::json!({
      "class": "workflow",
      "id": "diamond",
      "inputs": [{ "id": "x" }],
      "outputs": [{ "id": "out", "output_source": "d/out" }],
      "steps": [
        { "id": "a", "inputs": [{ "id": "x", "source": "x" }], "outputs": ["out"], "run": { "class": "tool", "id": "t" } },
        { "id": "b", "inputs": [{ "id": "x", "source": "a/out" }], "outputs": ["out"], "run": { "class": "tool", "id": "t" } },
        { "id": "c", "inputs": [{ "id": "x", "source": "a/out" }], "outputs": ["out"], "run": { "class": "tool", "id": "t" } },
        { "id": "d", "inputs": [{ "id": "x", "source": ["b/out", "c/out"] }], "outputs": ["out"], "run": { "class": "tool", "id": "t" } }
      ]
    });
    let process: Process = serde_json::from_value(doc).unwrap();
    match lock(process).unwrap() {
      Executable::Workflow(workflow) => workflow,
      Executable::Tool(_) => panic!("expected workflow"),
    }
  }

  #[test]
  fn test_diamond_relations() {
    let graph = diamond().graph();

    assert_eq!(graph.entry_points(), ["a"]);
    assert_eq!(graph.downstream("a"), ["b", "c"]);
    assert_eq!(graph.upstream("d"), ["b", "c"]);
    assert!(graph.is_join_point("d"));
    assert!(!graph.is_join_point("b"));
    assert_eq!(graph.producer("c/out"), Some("c"));
    assert_eq!(graph.producer("x"), None);
  }

  #[test]
  fn test_unknown_step() {
    let graph = diamond().graph();
    assert!(graph.downstream("missing").is_empty());
    assert!(graph.upstream("missing").is_empty());
  }
}
