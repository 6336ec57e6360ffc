//! Leaf tool execution for strand.
//!
//! This crate provides the [`ToolExecutor`] capability, which runs one tool
//! over concrete inputs and returns its output mapping, and the default
//! [`CommandExecutor`] that runs the tool's command as a local process.

mod error;
mod executor;
mod invocation;

pub use error::ToolError;
pub use executor::{CommandExecutor, ExecutorConfig, ToolExecutor};
pub use invocation::{Runtime, ToolInvocation, fill_in_defaults};
