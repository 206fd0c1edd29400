//! The filter stage handler.
//!
//! Generic over a (collection, item) type pair; the registry builds
//! one instance per concrete pair and caches it. The declarative
//! condition is compiled once and cached per stage id.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cadence_sequence::{CompiledCondition, StageDefinition, StageKind, TypePair, TypeTag};

use crate::diagnostics::{self, Direction};
use crate::error::EngineError;
use crate::handler::{StageHandler, StageScope, StageStep};
use crate::handlers::wrong_variant;
use crate::value::StepValue;

pub struct FilterHandler {
  pair: TypePair,
  compiled: RwLock<HashMap<String, CompiledCondition>>,
}

impl FilterHandler {
  pub fn new(pair: TypePair) -> Self {
    Self {
      pair,
      compiled: RwLock::new(HashMap::new()),
    }
  }

  /// Get the compiled predicate for a stage, compiling on first use.
  fn predicate(&self, stage_id: &str, condition: &cadence_sequence::Condition) -> CompiledCondition {
    {
      let compiled = self.compiled.read().unwrap_or_else(|e| e.into_inner());
      if let Some(predicate) = compiled.get(stage_id) {
        return predicate.clone();
      }
    }

    let mut compiled = self.compiled.write().unwrap_or_else(|e| e.into_inner());
    if let Some(predicate) = compiled.get(stage_id) {
      return predicate.clone();
    }
    let predicate = condition.compile();
    compiled.insert(stage_id.to_string(), predicate.clone());
    predicate
  }
}

#[async_trait]
impl StageHandler for FilterHandler {
  async fn execute(
    &self,
    stage: &StageDefinition,
    input: StepValue,
    scope: &mut StageScope<'_>,
  ) -> Result<StageStep, EngineError> {
    let StageKind::Filter(filter) = &stage.kind else {
      return Err(wrong_variant(&stage.stage_id, "filter"));
    };

    // Empty or null input short-circuits: no predicate evaluation and
    // no diagnostics body beyond the orchestrator's start/end markers.
    let items = match input.as_value() {
      None | Some(serde_json::Value::Null) => None,
      Some(serde_json::Value::Array(items)) if items.is_empty() => None,
      Some(serde_json::Value::Array(items)) => Some(items),
      Some(other) => {
        return Err(EngineError::TypeMismatch {
          stage_id: stage.stage_id.clone(),
          expected: self.pair.collection.to_string(),
          actual: TypeTag::infer(other).to_string(),
        });
      }
    };
    let Some(items) = items else {
      return Ok(StageStep::value(
        StepValue::Value(self.pair.collection.empty_collection()),
        stage.output_type.clone(),
      ));
    };

    diagnostics::emit(
      scope.services.diagnostics.as_ref(),
      scope.context,
      &stage.stage_id,
      Direction::In,
      || Some(serde_json::Value::Array(items.clone())),
      Some(&self.pair.collection),
      None,
    );

    let predicate = self.predicate(&stage.stage_id, &filter.condition);

    let mut kept = Vec::new();
    for item in items {
      if !self.pair.item.matches(item) {
        return Err(EngineError::TypeMismatch {
          stage_id: stage.stage_id.clone(),
          expected: self.pair.item.to_string(),
          actual: TypeTag::infer(item).to_string(),
        });
      }
      if predicate.matches(item) {
        kept.push(item.clone());
      }
    }

    let output = serde_json::Value::Array(kept);
    diagnostics::emit(
      scope.services.diagnostics.as_ref(),
      scope.context,
      &stage.stage_id,
      Direction::Out,
      || Some(output.clone()),
      Some(&self.pair.collection),
      None,
    );

    Ok(StageStep::value(
      StepValue::Value(output),
      stage.output_type.clone(),
    ))
  }
}
