use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::BoxError;
use crate::task::{Job, JobKind, TaskOutput};

/// Job that returns a fixed value.
#[derive(Debug)]
pub(crate) struct Constant(pub serde_json::Value);

#[async_trait]
impl Job for Constant {
  fn kind(&self) -> JobKind {
    JobKind::LeafExecute
  }

  fn name(&self) -> String {
    "constant".to_string()
  }

  async fn run(&self, _ctx: &mut JobContext) -> Result<TaskOutput, BoxError> {
    Ok(TaskOutput::Value(self.0.clone()))
  }
}
