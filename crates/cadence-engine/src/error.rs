//! Error types for stage execution.
//!
//! Stage-level errors are never retried inside the engine: they set the
//! owning thread's terminal outcome and bubble to whatever launched it.
//! Cancellation is a distinct terminal state, not a failure, and stays
//! distinguishable through [`EngineError::is_cancellation`].

use cadence_sequence::DefinitionError;
use thiserror::Error;

/// Errors that can occur during sequence execution.
#[derive(Debug, Error)]
pub enum EngineError {
  /// No handler is registered for the stage's variant. Fatal
  /// configuration error; surfaced to the caller, never retried.
  #[error("no stage handler registered for variant '{variant}'")]
  StageExecutorNotFound { variant: String },

  /// The stage's parameters are unusable as configured.
  #[error("stage '{stage_id}' configuration error: {message}")]
  Configuration { stage_id: String, message: String },

  /// A validator rejected the stage's configuration.
  #[error("stage '{stage_id}' failed validation: {message}")]
  Validation { stage_id: String, message: String },

  /// A declared input/output type did not match the runtime value.
  #[error("stage '{stage_id}' expected {expected} but got {actual}")]
  TypeMismatch {
    stage_id: String,
    expected: String,
    actual: String,
  },

  /// The method catalog has no entry for the declared actor type.
  #[error("no method '{method}' registered for actor type '{actor_type}'")]
  MethodNotFound { actor_type: String, method: String },

  /// The actor provider or the invoked actor failed.
  #[error("actor call failed for stage '{stage_id}': {message}")]
  Actor { stage_id: String, message: String },

  /// A signal publish failed.
  #[error("signal publish failed for stage '{stage_id}': {message}")]
  Signal { stage_id: String, message: String },

  /// A value could not be attached to the execution context.
  #[error("stage '{stage_id}' could not attach '{key}' to the context: {message}")]
  ContextAttach {
    stage_id: String,
    key: String,
    message: String,
  },

  /// An accessor failed to resolve or apply.
  #[error("accessor failed for stage '{stage_id}'")]
  Accessor {
    stage_id: String,
    #[source]
    source: DefinitionError,
  },

  /// A nested sequence run reported a failure.
  #[error("nested sequence '{sequence_id}' failed in stage '{stage_id}': {message}")]
  Nested {
    stage_id: String,
    sequence_id: String,
    error_code: Option<String>,
    message: String,
  },

  /// One or more forked inner threads of a foreach failed.
  #[error("foreach stage '{stage_id}': {failed} of {total} forked threads failed", failed = errors.len())]
  Aggregate {
    stage_id: String,
    total: usize,
    errors: Vec<EngineError>,
  },

  /// A foreach stage was re-entered while its forked threads were
  /// still outstanding. Hard invariant violation.
  #[error("foreach stage '{stage_id}' re-entered while forked threads are outstanding")]
  ForeachReentered { stage_id: String },

  /// The sequence catalog has no definition under the requested id.
  #[error("sequence '{sequence_id}' not found")]
  SequenceNotFound { sequence_id: String },

  /// The execution was cancelled through its context.
  #[error("execution cancelled")]
  Cancelled,

  /// A forked thread vanished before reporting its terminal state.
  #[error("fork join failed: {message}")]
  Join { message: String },
}

impl EngineError {
  /// True for the cancellation terminal state.
  pub fn is_cancellation(&self) -> bool {
    matches!(self, EngineError::Cancelled)
  }

  /// A stable machine-readable code for the error category.
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::StageExecutorNotFound { .. } => "stage_executor_not_found",
      EngineError::Configuration { .. } => "configuration",
      EngineError::Validation { .. } => "validation",
      EngineError::TypeMismatch { .. } => "type_mismatch",
      EngineError::MethodNotFound { .. } => "method_not_found",
      EngineError::Actor { .. } => "actor",
      EngineError::Signal { .. } => "signal",
      EngineError::ContextAttach { .. } => "context_attach",
      EngineError::Accessor { .. } => "accessor",
      EngineError::Nested { .. } => "nested_sequence_failed",
      EngineError::Aggregate { .. } => "aggregate",
      EngineError::ForeachReentered { .. } => "foreach_reentered",
      EngineError::SequenceNotFound { .. } => "sequence_not_found",
      EngineError::Cancelled => "cancelled",
      EngineError::Join { .. } => "join",
    }
  }
}
