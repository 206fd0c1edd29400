//! The call stage handler.
//!
//! Resolves the stage's method against its declared actor interface
//! type, builds the positional argument list from the registered
//! parameter bindings, runs the method's validators against the stage
//! configuration, and invokes the resolved actor asynchronously.
//! Method resolution is cached per stage id, not per call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cadence_sequence::{CallStage, StageDefinition, StageKind, TypeTag};

use crate::actor::CallArgument;
use crate::context::ExecutionContext;
use crate::diagnostics::{self, Direction};
use crate::error::EngineError;
use crate::handler::{StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::method::{MethodCatalog, MethodSpec, ParamBinding};
use crate::value::StepValue;

pub struct CallHandler {
  methods: Arc<dyn MethodCatalog>,
  resolved: RwLock<HashMap<String, Arc<MethodSpec>>>,
}

impl CallHandler {
  pub fn new(methods: Arc<dyn MethodCatalog>) -> Self {
    Self {
      methods,
      resolved: RwLock::new(HashMap::new()),
    }
  }

  /// Resolve the method spec for a stage, cached per stage id.
  fn resolve_method(
    &self,
    stage_id: &str,
    call: &CallStage,
  ) -> Result<Arc<MethodSpec>, EngineError> {
    {
      let resolved = self.resolved.read().unwrap_or_else(|e| e.into_inner());
      if let Some(spec) = resolved.get(stage_id) {
        return Ok(spec.clone());
      }
    }

    let spec = self
      .methods
      .lookup(&call.actor_type, &call.method)
      .ok_or_else(|| EngineError::MethodNotFound {
        actor_type: call.actor_type.clone(),
        method: call.method.clone(),
      })?;

    let mut resolved = self.resolved.write().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = resolved.get(stage_id) {
      return Ok(existing.clone());
    }
    resolved.insert(stage_id.to_string(), spec.clone());
    Ok(spec)
  }
}

#[async_trait]
impl StageHandler for CallHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::Call(call) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "call"));
    };

    let spec = self.resolve_method(&stage.stage_id, call)?;

    for validator in &spec.validators {
      validator(call.configuration.as_ref()).map_err(|message| EngineError::Validation {
        stage_id: stage.stage_id.clone(),
        message,
      })?;
    }

    // A cancelled context never reaches the actor provider.
    if scope.context.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    let call_context = match &call.configuration {
      Some(configuration) => scope
        .context
        .duplicate_with_config(Some(configuration.clone())),
      None => scope.context.clone(),
    };

    diagnostics::emit(
      scope.services.diagnostics.as_ref(),
      &call_context,
      &stage.stage_id,
      Direction::In,
      || Some(input.clone_or_null()),
      Some(&stage.input_type),
      None,
    );

    let actor = scope
      .services
      .actors
      .resolve(&call.actor_type, &input, &call_context)
      .await
      .map_err(|e| EngineError::Actor {
        stage_id: stage.stage_id.clone(),
        message: e.message,
      })?;

    let args = build_args(&spec, &call_context, &input, stage)?;
    let output = actor
      .invoke(&call.method, args, call_context.cancellation().clone())
      .await
      .map_err(|e| EngineError::Actor {
        stage_id: stage.stage_id.clone(),
        message: e.message,
      })?;

    diagnostics::emit(
      scope.services.diagnostics.as_ref(),
      &call_context,
      &stage.stage_id,
      Direction::Out,
      || Some(output.clone()),
      Some(&stage.output_type),
      None,
    );

    Ok(StageStep::value(
      StepValue::Value(output),
      stage.output_type.clone(),
    ))
  }
}

/// Build the positional argument list from the registered bindings.
fn build_args(
  spec: &MethodSpec,
  call_context: &ExecutionContext,
  input: &StepValue,
  stage: &StageDefinition,
) -> Result<Vec<CallArgument>, EngineError> {
  let mut args = Vec::with_capacity(spec.params.len());
  for param in &spec.params {
    match param {
      ParamBinding::Context => args.push(CallArgument::Context(call_context.clone())),
      ParamBinding::Input { expected } => match input.as_value() {
        Some(value) if expected.matches(value) => {
          args.push(CallArgument::Value(value.clone()));
        }
        Some(value) => {
          return Err(EngineError::TypeMismatch {
            stage_id: stage.stage_id.clone(),
            expected: expected.to_string(),
            actual: TypeTag::infer(value).to_string(),
          });
        }
        None => {
          return Err(EngineError::TypeMismatch {
            stage_id: stage.stage_id.clone(),
            expected: expected.to_string(),
            actual: "no value".to_string(),
          });
        }
      },
      ParamBinding::Default { value } => args.push(CallArgument::Value(value.clone())),
    }
  }
  Ok(args)
}
