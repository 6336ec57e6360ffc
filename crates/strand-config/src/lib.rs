//! Strand Config
//!
//! This crate contains the serializable document types for strand. These types
//! represent a declarative workflow graph (steps, data dependencies, merges and
//! expressions) before it is locked and handed to the orchestrator.
//!
//! Documents are loaded from JSON. A document is a single [`Process`], which is
//! either a leaf [`ToolDef`] or a [`WorkflowDef`] whose steps embed further
//! processes:
//!
//! ```json
//! {
//!   "class": "workflow",
//!   "id": "count-words",
//!   "inputs": [{ "id": "files" }],
//!   "outputs": [{ "id": "total", "output_source": "sum/total" }],
//!   "steps": [
//!     {
//!       "id": "wc",
//!       "inputs": [{ "id": "file", "source": "files" }],
//!       "outputs": ["count"],
//!       "scatter": { "keys": "file" },
//!       "run": { "class": "tool", "id": "wc", "command": ["wc", "-w", "{{ inputs.file }}"] }
//!     }
//!   ]
//! }
//! ```

mod process;
mod requirement;
mod source;
mod step;
mod workflow;

pub use process::{Process, ToolDef, ToolInput, ToolOutput};
pub use requirement::{ResourceRequirement, ResourceValue, Requirements};
pub use source::OneOrMany;
pub use step::{ScatterDef, StepDef, StepInput};
pub use workflow::{WorkflowDef, WorkflowInput, WorkflowOutput};
