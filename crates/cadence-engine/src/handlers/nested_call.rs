//! The nested-sequence-call stage handler.
//!
//! Launches a sub-sequence through the recursive entry point and
//! registers a post-process that folds the nested outcome back into
//! this stage: cancellation stays cancellation, failure propagates
//! with its error code, and a successful output is spliced, relayed,
//! or returned raw per the stage's flags.

use async_trait::async_trait;
use cadence_sequence::{DefinitionError, StageDefinition, StageKind};

use crate::error::EngineError;
use crate::handler::{PostProcess, StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::value::StepValue;

pub struct NestedSequenceCallHandler;

#[async_trait]
impl StageHandler for NestedSequenceCallHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::NestedSequenceCall(nested) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "nested_sequence_call"));
    };

    // No new nested sequence starts once cancellation is signaled.
    if scope.context.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    let sub_input = if nested.relay_input {
      input.clone()
    } else if let Some(accessor) = &nested.input_accessor {
      let value = input.as_value().ok_or_else(|| EngineError::Accessor {
        stage_id: stage.stage_id.clone(),
        source: DefinitionError::AccessorApply {
          path: accessor.to_string(),
          message: "the stage has no input to resolve against".to_string(),
        },
      })?;
      let resolved = accessor.get(value).ok_or_else(|| EngineError::Accessor {
        stage_id: stage.stage_id.clone(),
        source: DefinitionError::AccessorApply {
          path: accessor.to_string(),
          message: "path did not resolve against the input".to_string(),
        },
      })?;
      StepValue::Value(resolved)
    } else {
      input.clone()
    };

    // Stage-scoped redirection rules win over the ambient ones.
    let customization = nested.customization.merged_over(scope.customization);

    let outcome = scope
      .runner
      .run_sequence(&nested.sequence_id, &customization, sub_input, scope.context)
      .await;

    scope
      .thread
      .register_post_process(PostProcess::AggregateNestedCall {
        stage_id: stage.stage_id.clone(),
        sequence_id: nested.sequence_id.clone(),
        outcome,
        original_input: input,
        prevent_return: nested.prevent_return,
        set_accessor: nested.set_accessor.clone(),
      });

    Ok(StageStep::pending(stage.output_type.clone()))
  }
}
