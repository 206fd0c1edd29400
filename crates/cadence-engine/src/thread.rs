//! Execution thread state.

use std::sync::Arc;

use cadence_sequence::StageDefinition;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::value::StepValue;

/// Terminal state of an execution thread.
///
/// Cancellation is distinct from failure; callers must be able to tell
/// them apart.
#[derive(Debug)]
pub enum ThreadOutcome {
  Completed,
  Failed(EngineError),
  Cancelled,
}

/// One execution thread's working data.
///
/// Created when a thread starts or forks, mutated exclusively by its
/// own orchestrator, and pulled by the parent at join time.
#[derive(Debug)]
pub struct ThreadState {
  pub flow_id: String,
  /// Flow identity of the fan-out this thread was forked for, if any.
  pub nested_flow_id: Option<String>,
  pub execution_id: String,
  pub parent_execution_id: Option<String>,
  pub stage_index: usize,
  pub input: StepValue,
  pub output: StepValue,
  pub outcome: Option<ThreadOutcome>,
}

impl ThreadState {
  /// Seed a root thread from its context and launch input.
  pub fn root(context: &ExecutionContext, input: StepValue) -> Self {
    Self {
      flow_id: context.flow_id().to_string(),
      nested_flow_id: None,
      execution_id: context.execution_id().to_string(),
      parent_execution_id: context.parent_execution_id().map(str::to_string),
      stage_index: 0,
      input,
      output: StepValue::None,
      outcome: None,
    }
  }

  /// Seed a forked inner thread for one collection element.
  pub fn forked(
    context: &ExecutionContext,
    nested_flow_id: impl Into<String>,
    element: serde_json::Value,
  ) -> Self {
    Self {
      flow_id: context.flow_id().to_string(),
      nested_flow_id: Some(nested_flow_id.into()),
      execution_id: context.execution_id().to_string(),
      parent_execution_id: context.parent_execution_id().map(str::to_string),
      stage_index: 0,
      input: StepValue::Value(element),
      output: StepValue::None,
      outcome: None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.outcome.is_some()
  }
}

/// A forked inner thread waiting to be driven by its own orchestrator.
///
/// Pure data: the parent orchestrator supplies the registry, services,
/// and runner when it spawns the child.
pub struct ChildThread {
  pub state: ThreadState,
  pub context: ExecutionContext,
  pub stages: Arc<[StageDefinition]>,
}
