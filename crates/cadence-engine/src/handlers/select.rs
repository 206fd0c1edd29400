//! The select stage handler.
//!
//! Projects a value out of the input. When the declared output type is
//! `Any` the actual type is inferred from the projected value;
//! otherwise the declared type is enforced.

use async_trait::async_trait;
use cadence_sequence::{DefinitionError, StageDefinition, StageKind, TypeTag};

use crate::error::EngineError;
use crate::handler::{StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::value::StepValue;

pub struct SelectHandler;

#[async_trait]
impl StageHandler for SelectHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    _scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::Select(select) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "select"));
    };

    let value = input.as_value().ok_or_else(|| EngineError::Accessor {
      stage_id: stage.stage_id.clone(),
      source: DefinitionError::AccessorApply {
        path: select.accessor.to_string(),
        message: "the stage has no input to project from".to_string(),
      },
    })?;

    let projected = select
      .accessor
      .get(value)
      .ok_or_else(|| EngineError::Accessor {
        stage_id: stage.stage_id.clone(),
        source: DefinitionError::AccessorApply {
          path: select.accessor.to_string(),
          message: "path did not resolve against the input".to_string(),
        },
      })?;

    let output_type = if stage.output_type == TypeTag::Any {
      TypeTag::infer(&projected)
    } else if stage.output_type.matches(&projected) {
      stage.output_type.clone()
    } else {
      return Err(EngineError::TypeMismatch {
        stage_id: stage.stage_id.clone(),
        expected: stage.output_type.to_string(),
        actual: TypeTag::infer(&projected).to_string(),
      });
    };

    Ok(StageStep::value(StepValue::Value(projected), output_type))
  }
}
