//! Strand host engine
//!
//! A task graph that grows while it runs. Jobs add tasks and dependency edges
//! through their [`JobContext`]; the additions are merged into the run graph
//! once the job returns.
//!
//! # Edges
//!
//! - `add_child(parent, child)`: `child` runs once `parent` has completed.
//! - `add_dependent(producer, consumer)`: `consumer` additionally waits for
//!   every promise in the producer's result.
//! - `add_follow_on(before, after)`: `after` additionally waits for every task
//!   below `before` (children, their follow-ons, and so on).
//!
//! # Results
//!
//! A job returns a [`TaskOutput`], which may point at results of tasks it
//! created. [`JobContext::resolve`] collapses such promises into plain JSON.
//!
//! # Usage
//!
//! ```ignore
//! use strand_engine::{EngineConfig, LocalEngine, TaskSpec, Resources};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = LocalEngine::new(EngineConfig::default());
//! let value = engine
//!   .run_task(TaskSpec::new(my_job, Resources::default()), CancellationToken::new())
//!   .await?;
//! ```

mod context;
mod engine;
mod error;
mod events;
mod graph;
mod task;
#[cfg(test)]
mod tests_support;

pub use context::{JobContext, Results};
pub use engine::{EngineConfig, LocalEngine};
pub use error::{BoxError, EngineError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use graph::TaskGraph;
pub use task::{Job, JobKind, Resources, TaskId, TaskOutput, TaskSpec};
