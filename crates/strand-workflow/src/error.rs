use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("duplicate step id in workflow '{workflow_id}': {step_id}")]
  DuplicateStepId {
    workflow_id: String,
    step_id: String,
  },

  #[error("duplicate input '{input_id}' in '{scope}'")]
  DuplicateInput { scope: String, input_id: String },

  #[error("duplicate output '{output_id}' in '{scope}'")]
  DuplicateOutput { scope: String, output_id: String },

  #[error("step '{step_id}' scatters over '{key}', which is not one of its inputs")]
  UnknownScatterKey { step_id: String, key: String },

  #[error("step '{step_id}' declares a scatter with no keys")]
  EmptyScatter { step_id: String },

  #[error("output '{output_id}' in '{scope}' has no source")]
  MissingOutputSource { scope: String, output_id: String },
}
