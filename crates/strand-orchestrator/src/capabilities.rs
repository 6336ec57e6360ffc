use std::sync::Arc;

use strand_expr::Evaluator;
use strand_tool::{ExecutorConfig, ToolExecutor};

/// External capabilities every job needs: running a leaf tool and
/// evaluating expressions.
#[derive(Clone)]
pub struct Capabilities {
  pub executor: Arc<dyn ToolExecutor>,
  pub evaluator: Arc<dyn Evaluator>,
  pub executor_config: ExecutorConfig,
}

impl Capabilities {
  pub fn new(
    executor: Arc<dyn ToolExecutor>,
    evaluator: Arc<dyn Evaluator>,
    executor_config: ExecutorConfig,
  ) -> Self {
    Self {
      executor,
      evaluator,
      executor_config,
    }
  }
}

impl std::fmt::Debug for Capabilities {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Capabilities")
      .field("executor_config", &self.executor_config)
      .finish_non_exhaustive()
  }
}
