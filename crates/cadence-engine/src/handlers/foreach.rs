//! The foreach stage handler - fork side of the fork/join protocol.
//!
//! Creates one inner execution thread per collection element, registers
//! them on the parent orchestrator together with an aggregation
//! post-process, and returns immediately with a no-op result: the
//! parent thread is then "pending fork" and may not advance until
//! every inner thread is terminal. The join side lives in the
//! orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_sequence::{DefinitionError, ForeachStage, StageDefinition, StageKind, TypeTag};

use crate::error::EngineError;
use crate::handler::{PostProcess, StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::thread::{ChildThread, ThreadState};
use crate::value::StepValue;

pub struct ForeachHandler;

#[async_trait]
impl StageHandler for ForeachHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::Foreach(foreach) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "foreach"));
    };

    // Re-entering a fork point while inner threads are outstanding is
    // a hard invariant violation.
    if scope.thread.has_outstanding_fork() {
      return Err(EngineError::ForeachReentered {
        stage_id: stage.stage_id.clone(),
      });
    }

    let (collection, carried) = resolve_collection(stage, foreach, input)?;

    let items = match collection {
      serde_json::Value::Null => Vec::new(),
      serde_json::Value::Array(items) => items,
      other => {
        return Err(EngineError::TypeMismatch {
          stage_id: stage.stage_id.clone(),
          expected: TypeTag::array(foreach.element_type.clone()).to_string(),
          actual: TypeTag::infer(&other).to_string(),
        });
      }
    };

    // Empty input forks nothing and yields the declared empty
    // collection.
    if items.is_empty() {
      return empty_result(stage, foreach, carried);
    }

    let stages: Arc<[StageDefinition]> = foreach.stages.clone().into();
    let mut children = Vec::with_capacity(items.len());
    for element in items {
      let context = scope.context.derive();
      let state = ThreadState::forked(&context, &foreach.nested_flow_id, element);
      children.push(ChildThread {
        state,
        context,
        stages: Arc::clone(&stages),
      });
    }

    scope.thread.set_inner_threads(&stage.stage_id, children);
    scope.thread.register_post_process(PostProcess::AggregateForeach {
      stage_id: stage.stage_id.clone(),
      element_type: foreach.element_type.clone(),
      splice: carried.zip(foreach.set_accessor.clone()),
    });

    Ok(StageStep::pending(stage.output_type.clone()))
  }
}

/// Locate the collection to iterate, and the carried object when the
/// foreach mutates a field rather than replacing the whole value.
fn resolve_collection(
  stage: &StageDefinition,
  foreach: &ForeachStage,
  input: StepValue,
) -> Result<(serde_json::Value, Option<serde_json::Value>), EngineError> {
  match (&foreach.source_accessor, input) {
    (Some(accessor), StepValue::Value(carried)) => {
      let collection = accessor
        .get(&carried)
        .ok_or_else(|| EngineError::Accessor {
          stage_id: stage.stage_id.clone(),
          source: DefinitionError::AccessorApply {
            path: accessor.to_string(),
            message: "path did not resolve against the input".to_string(),
          },
        })?;
      Ok((collection, Some(carried)))
    }
    (Some(_), StepValue::None) => Err(EngineError::Configuration {
      stage_id: stage.stage_id.clone(),
      message: "source accessor configured but the stage has no input".to_string(),
    }),
    (None, StepValue::Value(collection)) => Ok((collection, None)),
    (None, StepValue::None) => Ok((serde_json::Value::Null, None)),
  }
}

fn empty_result(
  stage: &StageDefinition,
  foreach: &ForeachStage,
  carried: Option<serde_json::Value>,
) -> Result<StageStep, EngineError> {
  let empty = serde_json::Value::Array(Vec::new());
  match (carried, &foreach.set_accessor) {
    (Some(mut carried), Some(accessor)) => {
      accessor
        .set(&mut carried, empty)
        .map_err(|source| EngineError::Accessor {
          stage_id: stage.stage_id.clone(),
          source,
        })?;
      Ok(StageStep::value(
        StepValue::Value(carried),
        stage.output_type.clone(),
      ))
    }
    _ => Ok(StageStep::value(
      StepValue::Value(empty),
      stage.output_type.clone(),
    )),
  }
}
