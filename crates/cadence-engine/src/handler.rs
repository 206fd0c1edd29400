//! The stage handler contract.
//!
//! A handler is a unit of behavior bound to exactly one stage variant
//! (and, for the generic filter variant, to a concrete type pair). It
//! executes one stage against an input value and a scope, returning a
//! typed step result. Fan-out and nested-call handlers do not compute
//! their final output directly: they register an explicit
//! [`PostProcess`] continuation that the orchestrator interprets once
//! the deferred work is terminal.

use async_trait::async_trait;
use cadence_sequence::{Accessor, Customization, StageDefinition, TypeTag};

use crate::catalog::{SequenceOutcome, SequenceRunner};
use crate::context::ExecutionContext;
use crate::engine::EngineServices;
use crate::error::EngineError;
use crate::orchestrator::ThreadControl;
use crate::value::StepValue;

/// The outcome of one stage execution.
#[derive(Debug)]
pub struct StageStep {
  pub output: StepValue,
  /// The effective type of the output, which may be narrower than the
  /// stage's declared type (Select narrows a declared `Any` to the
  /// inferred tag). Stamped on the stage's Out diagnostic record.
  pub output_type: TypeTag,
}

impl StageStep {
  /// A stage producing a value of the given declared type.
  pub fn value(output: StepValue, output_type: TypeTag) -> Self {
    Self {
      output,
      output_type,
    }
  }

  /// A pass-through stage: output equals input.
  pub fn pass_through(input: StepValue, output_type: TypeTag) -> Self {
    Self {
      output: input,
      output_type,
    }
  }

  /// A no-op step for a stage whose real output comes from a
  /// registered post-process continuation.
  pub fn pending(output_type: TypeTag) -> Self {
    Self {
      output: StepValue::None,
      output_type,
    }
  }
}

/// Deferred aggregation logic, registered by a handler and interpreted
/// by the orchestrator exactly once.
///
/// An explicit continuation value rather than a closure, so nothing
/// captures engine internals across threads.
pub enum PostProcess {
  /// Collect the outputs of a foreach stage's forked inner threads
  /// once they are all terminal.
  AggregateForeach {
    stage_id: String,
    element_type: TypeTag,
    /// The carried object and the path to splice the aggregated
    /// collection into, when the foreach mutates a field rather than
    /// replacing the whole value.
    splice: Option<(serde_json::Value, Accessor)>,
  },
  /// Fold a nested sequence run's outcome into the calling stage.
  AggregateNestedCall {
    stage_id: String,
    sequence_id: String,
    outcome: SequenceOutcome,
    original_input: StepValue,
    prevent_return: bool,
    set_accessor: Option<Accessor>,
  },
}

/// Everything a handler may touch during one stage execution.
pub struct StageScope<'a> {
  pub context: &'a ExecutionContext,
  pub services: &'a EngineServices,
  pub runner: &'a dyn SequenceRunner,
  /// Ambient redirection rules carried by the calling thread.
  pub customization: &'a Customization,
  pub thread: &'a mut ThreadControl,
}

/// A unit of behavior bound to one stage variant.
#[async_trait]
pub trait StageHandler: Send + Sync {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError>;
}
