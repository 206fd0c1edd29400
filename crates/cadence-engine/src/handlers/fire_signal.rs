//! The fire-signal stage handler.
//!
//! Publishes a payload extracted from the input, then passes the input
//! through unchanged so signal stages can be inserted anywhere without
//! breaking the pipeline's data flow.

use async_trait::async_trait;
use cadence_sequence::{DefinitionError, StageDefinition, StageKind};
use futures::future::try_join_all;

use crate::error::EngineError;
use crate::handler::{StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::signal::SignalTarget;
use crate::value::StepValue;

pub struct FireSignalHandler;

#[async_trait]
impl StageHandler for FireSignalHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::FireSignal(fire) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "fire_signal"));
    };

    let target = if let Some(id) = &fire.signal_id {
      SignalTarget::Id(id.clone())
    } else if let Some(name) = &fire.signal_name {
      SignalTarget::Name(name.clone())
    } else {
      return Err(EngineError::Configuration {
        stage_id: stage.stage_id.clone(),
        message: "fire_signal names neither a signal id nor a signal name".to_string(),
      });
    };

    let payload = match &fire.accessor {
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

    let cancel = scope.context.cancellation();
    match payload {
      // Multi mode fans one publish out per element, awaited
      // concurrently.
      serde_json::Value::Array(items) if fire.multi => {
        let publishes = items.into_iter().map(|item| {
          scope
            .services
            .signals
            .fire(&target, item, cancel.clone())
        });
        try_join_all(publishes)
          .await
          .map_err(|e| EngineError::Signal {
            stage_id: stage.stage_id.clone(),
            message: e.message,
          })?;
      }
      payload => {
        scope
          .services
          .signals
          .fire(&target, payload, cancel.clone())
          .await
          .map_err(|e| EngineError::Signal {
            stage_id: stage.stage_id.clone(),
            message: e.message,
          })?;
      }
    }

    Ok(StageStep::pass_through(input, stage.output_type.clone()))
  }
}
