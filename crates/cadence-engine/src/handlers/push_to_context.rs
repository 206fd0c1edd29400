//! The push-to-context stage handler.
//!
//! Resolves a value from the input and attaches it to the execution
//! context as typed side-channel data, retrievable by downstream
//! stages and nested calls. Output equals input.

use async_trait::async_trait;
use cadence_sequence::{DefinitionError, StageDefinition, StageKind, TypeTag};

use crate::error::EngineError;
use crate::handler::{StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::value::StepValue;

pub struct PushToContextHandler;

#[async_trait]
impl StageHandler for PushToContextHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::PushToContext(push) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "push_to_context"));
    };

    let value = match &push.accessor {
      Some(accessor) => {
        let value = input.as_value().ok_or_else(|| EngineError::Accessor {
          stage_id: stage.stage_id.clone(),
          source: DefinitionError::AccessorApply {
            path: accessor.to_string(),
            message: "the stage has no input to resolve against".to_string(),
          },
        })?;
        accessor.get(value).ok_or_else(|| EngineError::Accessor {
          stage_id: stage.stage_id.clone(),
          source: DefinitionError::AccessorApply {
            path: accessor.to_string(),
            message: "path did not resolve against the input".to_string(),
          },
        })?
      }
      None => input.clone_or_null(),
    };

    // A resolved null carries nothing worth attaching; fatal.
    if value.is_null() {
      return Err(EngineError::ContextAttach {
        stage_id: stage.stage_id.clone(),
        key: push.key.clone(),
        message: "resolved value is null".to_string(),
      });
    }

    let tag = TypeTag::infer(&value);
    if !scope
      .context
      .attach(&push.key, tag, value, push.override_existing)
    {
      return Err(EngineError::ContextAttach {
        stage_id: stage.stage_id.clone(),
        key: push.key.clone(),
        message: "key already present and override is not set".to_string(),
      });
    }

    Ok(StageStep::pass_through(input, stage.output_type.clone()))
  }
}
