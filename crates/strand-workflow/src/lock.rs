use std::collections::HashSet;
use std::sync::Arc;

use strand_config::{Process, Requirements, StepDef, ToolDef, WorkflowDef};

use crate::error::WorkflowError;
use crate::workflow::{Executable, Step, Workflow};

/// Lock a process document into an immutable, validated tree.
///
/// This process:
/// 1. Checks identifier uniqueness within every scope
/// 2. Checks scatter keys against the step's declared inputs
/// 3. Pushes requirements down so every process carries its effective set
pub fn lock(process: Process) -> Result<Executable, WorkflowError> {
  lock_process(process, &Requirements::default())
}

fn lock_process(process: Process, inherited: &Requirements) -> Result<Executable, WorkflowError> {
  match process {
    Process::Tool(tool) => lock_tool(tool, inherited).map(|tool| Executable::Tool(Arc::new(tool))),
    Process::Workflow(workflow) => {
      lock_workflow(workflow, inherited).map(|wf| Executable::Workflow(Arc::new(wf)))
    }
  }
}

fn lock_tool(mut tool: ToolDef, inherited: &Requirements) -> Result<ToolDef, WorkflowError> {
  ensure_unique(&tool.id, tool.inputs.iter().map(|i| &i.id), |scope, id| {
    WorkflowError::DuplicateInput {
      scope,
      input_id: id,
    }
  })?;
  ensure_unique(&tool.id, tool.outputs.iter().map(|o| &o.id), |scope, id| {
    WorkflowError::DuplicateOutput {
      scope,
      output_id: id,
    }
  })?;

  tool.requirements = tool.requirements.inherit(inherited);
  Ok(tool)
}

fn lock_workflow(def: WorkflowDef, inherited: &Requirements) -> Result<Workflow, WorkflowError> {
  ensure_unique(&def.id, def.inputs.iter().map(|i| &i.id), |scope, id| {
    WorkflowError::DuplicateInput {
      scope,
      input_id: id,
    }
  })?;
  ensure_unique(&def.id, def.outputs.iter().map(|o| &o.id), |scope, id| {
    WorkflowError::DuplicateOutput {
      scope,
      output_id: id,
    }
  })?;
  ensure_unique(&def.id, def.steps.iter().map(|s| &s.id), |scope, id| {
    WorkflowError::DuplicateStepId {
      workflow_id: scope,
      step_id: id,
    }
  })?;

  if let Some(output) = def.outputs.iter().find(|o| o.output_source.is_empty()) {
    return Err(WorkflowError::MissingOutputSource {
      scope: def.id.clone(),
      output_id: output.id.clone(),
    });
  }

  let requirements = def.requirements.inherit(inherited);

  let steps = def
    .steps
    .into_iter()
    .map(|step| lock_step(step, &requirements).map(Arc::new))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(Workflow {
    id: def.id,
    inputs: def.inputs,
    outputs: def.outputs,
    steps,
    requirements,
  })
}

fn lock_step(def: StepDef, inherited: &Requirements) -> Result<Step, WorkflowError> {
  ensure_unique(&def.id, def.inputs.iter().map(|i| &i.id), |scope, id| {
    WorkflowError::DuplicateInput {
      scope,
      input_id: id,
    }
  })?;

  if let Some(scatter) = &def.scatter {
    if scatter.keys.is_empty() {
      return Err(WorkflowError::EmptyScatter {
        step_id: def.id.clone(),
      });
    }
    for key in scatter.keys.as_slice() {
      if !def.inputs.iter().any(|input| &input.id == key) {
        return Err(WorkflowError::UnknownScatterKey {
          step_id: def.id.clone(),
          key: key.clone(),
        });
      }
    }
  }

  let requirements = def.requirements.inherit(inherited);
  let run = lock_process(def.run, &requirements)?;

  Ok(Step {
    id: def.id,
    inputs: def.inputs,
    outputs: def.outputs,
    scatter: def.scatter,
    run,
    requirements,
  })
}

fn ensure_unique<'a>(
  scope: &str,
  ids: impl Iterator<Item = &'a String>,
  err: impl Fn(String, String) -> WorkflowError,
) -> Result<(), WorkflowError> {
  let mut seen = HashSet::new();
  for id in ids {
    if !seen.insert(id.as_str()) {
      return Err(err(scope.to_string(), id.clone()));
    }
  }
  Ok(())
}
