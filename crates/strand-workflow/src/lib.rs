//! Strand Workflow
//!
//! This crate provides the "locked" document representation for strand.
//! A locked document is a validated form of a [`strand_config::Process`] that
//! is ready to be scheduled.
//!
//! Key differences from `strand-config`:
//! - Step ids, input keys and output ids are unique within their scope
//! - Scatter keys name declared step inputs
//! - Requirements are inherited down the tree, so every tool carries its
//!   effective resource requirement and expression globals
//! - The tree is immutable and shared behind `Arc`, so tasks can hold parts of
//!   it without copying

mod error;
mod graph;
mod lock;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use lock::lock;
pub use strand_config::{
  OneOrMany, ResourceRequirement, ResourceValue, Requirements, ScatterDef, StepInput, ToolDef,
  ToolInput, ToolOutput, WorkflowInput, WorkflowOutput,
};
pub use workflow::{Executable, Step, Workflow};
