//! Error types for sequence definitions.

use thiserror::Error;

/// Errors raised while parsing or applying definition constructs.
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
  /// An accessor path string could not be parsed.
  #[error("invalid accessor path '{path}': {message}")]
  AccessorParse { path: String, message: String },

  /// An accessor could not be applied to a value.
  #[error("accessor '{path}' cannot be applied: {message}")]
  AccessorApply { path: String, message: String },

  /// A sequence contains two stages with the same id.
  #[error("sequence '{sequence_id}' declares stage id '{stage_id}' more than once")]
  DuplicateStageId {
    sequence_id: String,
    stage_id: String,
  },

  /// A sequence has no stages.
  #[error("sequence '{sequence_id}' has no stages")]
  EmptySequence { sequence_id: String },

  /// A fire-signal stage names neither a signal id nor a signal name.
  #[error("stage '{stage_id}' fires a signal but names neither a signal id nor a signal name")]
  MissingSignalTarget { stage_id: String },
}
