//! Execution events and notifiers for observability.
//!
//! Events are emitted while a task graph runs so consumers can observe
//! progress, stream it to a UI, or persist it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::task::{JobKind, TaskId};

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  RunStarted { run_id: String, tasks: usize },

  /// A task has started executing.
  TaskStarted {
    run_id: String,
    task_id: TaskId,
    kind: JobKind,
    name: String,
  },

  /// A task has completed successfully.
  TaskCompleted {
    run_id: String,
    task_id: TaskId,
    name: String,
    /// Number of tasks the job added to the graph.
    spawned: usize,
  },

  /// A task has failed.
  TaskFailed {
    run_id: String,
    task_id: TaskId,
    name: String,
    error: String,
  },

  /// The run has completed successfully.
  RunCompleted { run_id: String, tasks: usize },

  /// The run has failed.
  RunFailed { run_id: String, error: String },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // NOTE: Unbounded so a slow consumer never blocks the run loop. Volume is
  // a handful of events per task.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
