//! Local task engine.
//!
//! Runs a [`TaskGraph`] in-process. Ready tasks are executed concurrently in
//! batches; graph additions made by jobs are merged between batches.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::context::{JobContext, Results};
use crate::error::{BoxError, EngineError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::graph::TaskGraph;
use crate::task::{TaskId, TaskOutput, TaskSpec};

/// Configuration for the local engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Cores that tasks in one batch may reserve together. A single task that
  /// asks for more still runs, alone.
  pub max_cores: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    let cores = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1);
    Self {
      max_cores: cores as f64,
    }
  }
}

/// The in-process engine.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `LocalEngine::new()` for no-op notifications.
pub struct LocalEngine<N: ExecutionNotifier = NoopNotifier> {
  config: EngineConfig,
  notifier: N,
}

impl LocalEngine<NoopNotifier> {
  pub fn new(config: EngineConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

type Finished = (TaskId, String, Result<TaskOutput, BoxError>, TaskGraph);

impl<N: ExecutionNotifier> LocalEngine<N> {
  pub fn with_notifier(config: EngineConfig, notifier: N) -> Self {
    Self { config, notifier }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Run a single root task and everything it spawns.
  pub async fn run_task(
    &self,
    root: TaskSpec,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, EngineError> {
    let mut graph = TaskGraph::new();
    let id = graph.add_task(root);
    self.run(graph, id, cancel).await
  }

  /// Run `graph` to completion and return the resolved result of `result`.
  #[instrument(name = "engine_run", skip(self, graph, cancel), fields(tasks = graph.len()))]
  pub async fn run(
    &self,
    mut graph: TaskGraph,
    result: TaskId,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, EngineError> {
    if !graph.contains(result) {
      return Err(EngineError::UnknownTask { task_id: result });
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let results = Results::new();

    info!(run_id = %run_id, tasks = graph.len(), "run_started");
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      tasks: graph.len(),
    });

    let outcome = match self.run_loop(&run_id, &mut graph, &results, &cancel).await {
      Ok(()) => results
        .get(result)
        .ok_or(EngineError::MissingResult { task_id: result })
        .and_then(|output| results.resolve(&output)),
      Err(e) => Err(e),
    };

    match &outcome {
      Ok(_) => {
        info!(run_id = %run_id, tasks = graph.len(), "run_completed");
        self.notifier.notify(ExecutionEvent::RunCompleted {
          run_id,
          tasks: graph.len(),
        });
      }
      Err(e) => {
        error!(run_id = %run_id, error = %e, "run_failed");
        self.notifier.notify(ExecutionEvent::RunFailed {
          run_id,
          error: e.to_string(),
        });
      }
    }

    outcome
  }

  async fn run_loop(
    &self,
    run_id: &str,
    graph: &mut TaskGraph,
    results: &Results,
    cancel: &CancellationToken,
  ) -> Result<(), EngineError> {
    let mut done: HashSet<TaskId> = HashSet::new();

    loop {
      if cancel.is_cancelled() {
        warn!(run_id = %run_id, "run cancelled");
        return Err(EngineError::Cancelled);
      }

      if done.len() == graph.len() {
        return Ok(());
      }

      let ready = find_ready(graph, &done, results);
      if ready.is_empty() {
        let pending = graph.len() - done.len();
        error!(run_id = %run_id, pending, "run stalled");
        return Err(EngineError::Stalled { pending });
      }

      let batch = self.take_batch(graph, ready);

      info!(run_id = %run_id, batch_size = batch.len(), "executing batch of ready tasks");

      let handles: Vec<_> = batch
        .into_iter()
        .filter_map(|id| graph.get(id).map(|spec| (id, spec.clone())))
        .map(|(id, spec)| {
          let name = spec.job.name();
          info!(run_id = %run_id, task_id = %id, kind = %spec.job.kind(), name = %name, "task_started");
          self.notifier.notify(ExecutionEvent::TaskStarted {
            run_id: run_id.to_string(),
            task_id: id,
            kind: spec.job.kind(),
            name: name.clone(),
          });

          let job = Arc::clone(&spec.job);
          let mut ctx = JobContext::new(id, spec.resources, results.clone());
          tokio::spawn(async move {
            let output = job.run(&mut ctx).await;
            let finished: Finished = (id, name, output, ctx.into_staged());
            finished
          })
        })
        .collect();

      let finished = tokio::select! {
        finished = futures::future::join_all(handles) => finished,
        _ = cancel.cancelled() => {
          warn!(run_id = %run_id, "run cancelled during task execution");
          return Err(EngineError::Cancelled);
        }
      };

      for joined in finished {
        let (id, name, output, staged) = joined.map_err(|e| EngineError::Join {
          message: e.to_string(),
        })?;

        match output {
          Ok(output) => {
            let spawned = staged.len();
            info!(run_id = %run_id, task_id = %id, name = %name, spawned, "task_completed");
            results.insert(id, output);
            done.insert(id);
            graph.merge(staged);
            self.notifier.notify(ExecutionEvent::TaskCompleted {
              run_id: run_id.to_string(),
              task_id: id,
              name,
              spawned,
            });
          }
          Err(source) => {
            error!(run_id = %run_id, task_id = %id, name = %name, error = %source, "task_failed");
            self.notifier.notify(ExecutionEvent::TaskFailed {
              run_id: run_id.to_string(),
              task_id: id,
              name: name.clone(),
              error: source.to_string(),
            });
            return Err(EngineError::TaskFailed {
              task_id: id,
              name,
              source,
            });
          }
        }
      }
    }
  }

  /// Take ready tasks, in order, while their reserved cores fit.
  fn take_batch(&self, graph: &TaskGraph, ready: Vec<TaskId>) -> Vec<TaskId> {
    let mut batch = Vec::new();
    let mut cores = 0.0;

    for id in ready {
      let wanted = graph.get(id).map(|spec| spec.resources.cores).unwrap_or(0.0);
      if !batch.is_empty() && cores + wanted > self.config.max_cores {
        break;
      }
      cores += wanted;
      batch.push(id);
    }

    batch
  }
}

/// Tasks whose dependencies are all satisfied.
fn find_ready(graph: &TaskGraph, done: &HashSet<TaskId>, results: &Results) -> Vec<TaskId> {
  let settled = |id: &TaskId| done.contains(id) && results.is_settled(*id);

  graph
    .task_ids()
    .iter()
    .filter(|id| !done.contains(*id))
    .filter(|id| graph.parents(**id).iter().all(|parent| done.contains(parent)))
    .filter(|id| graph.producers(**id).iter().all(|producer| settled(producer)))
    .filter(|id| {
      graph.predecessors(**id).iter().all(|before| {
        settled(before) && graph.descendants(*before).iter().all(|d| done.contains(d))
      })
    })
    .copied()
    .collect()
}
