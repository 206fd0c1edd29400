//! Stage definitions.
//!
//! A stage definition is one immutable pipeline node: a unique id, the
//! declared input and output types, and variant-specific parameters.
//! The variant set is closed; the engine installs one handler per
//! variant at construction time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::accessor::Accessor;
use crate::condition::Condition;
use crate::customization::Customization;
use crate::types::TypeTag;

/// One pipeline node, ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
  pub stage_id: String,
  pub input_type: TypeTag,
  pub output_type: TypeTag,
  #[serde(flatten)]
  pub kind: StageKind,
}

/// The closed set of stage variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageKind {
  Call(CallStage),
  Filter(FilterStage),
  Foreach(ForeachStage),
  FireSignal(FireSignalStage),
  PushToContext(PushToContextStage),
  Select(SelectStage),
  NestedSequenceCall(NestedSequenceCallStage),
}

/// Discriminant of [`StageKind`], used as the registry dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageVariant {
  Call,
  Filter,
  Foreach,
  FireSignal,
  PushToContext,
  Select,
  NestedSequenceCall,
}

impl StageKind {
  pub fn variant(&self) -> StageVariant {
    match self {
      StageKind::Call(_) => StageVariant::Call,
      StageKind::Filter(_) => StageVariant::Filter,
      StageKind::Foreach(_) => StageVariant::Foreach,
      StageKind::FireSignal(_) => StageVariant::FireSignal,
      StageKind::PushToContext(_) => StageVariant::PushToContext,
      StageKind::Select(_) => StageVariant::Select,
      StageKind::NestedSequenceCall(_) => StageVariant::NestedSequenceCall,
    }
  }
}

impl fmt::Display for StageVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StageVariant::Call => "call",
      StageVariant::Filter => "filter",
      StageVariant::Foreach => "foreach",
      StageVariant::FireSignal => "fire_signal",
      StageVariant::PushToContext => "push_to_context",
      StageVariant::Select => "select",
      StageVariant::NestedSequenceCall => "nested_sequence_call",
    };
    write!(f, "{}", name)
  }
}

/// Invoke a method on a remote actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStage {
  /// The declared actor interface type the method is resolved against.
  pub actor_type: String,
  /// The method name within the actor type.
  pub method: String,
  /// Stage-scoped configuration attached to the duplicated context for
  /// this call and checked by the method's validators.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub configuration: Option<serde_json::Value>,
}

/// Keep the collection items matching a condition, preserving order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStage {
  pub item_type: TypeTag,
  pub condition: Condition,
}

/// Fan out over a collection: one forked inner thread per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachStage {
  /// Declared element type of the aggregated output collection.
  pub element_type: TypeTag,
  /// Flow identity stamped on every forked inner thread.
  pub nested_flow_id: String,
  /// The stage list each inner thread runs against its element.
  pub stages: Vec<StageDefinition>,
  /// Where to find the collection inside a carried object. Absent
  /// means the stage input is the collection itself.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_accessor: Option<Accessor>,
  /// Where to splice the aggregated collection back into the carried
  /// object. Absent means the collection replaces the stage output.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub set_accessor: Option<Accessor>,
}

/// Publish a signal; the stage output is its input unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireSignalStage {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub signal_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub signal_name: Option<String>,
  /// Extracts the payload from the input; absent publishes the whole
  /// input.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub accessor: Option<Accessor>,
  /// When set and the payload is itself a collection, one publish is
  /// fired per element.
  #[serde(default)]
  pub multi: bool,
}

/// Attach a value to the execution context as side-channel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushToContextStage {
  pub key: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub accessor: Option<Accessor>,
  #[serde(default)]
  pub override_existing: bool,
}

/// Project a value out of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStage {
  pub accessor: Accessor,
}

/// Launch a nested sequence through the recursive entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSequenceCallStage {
  pub sequence_id: String,
  /// Extracts the sub-sequence input from the stage input; ignored
  /// when `relay_input` is set.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input_accessor: Option<Accessor>,
  /// Reuse the stage input as the sub-sequence input unchanged.
  #[serde(default)]
  pub relay_input: bool,
  /// Discard the nested output and pass the original input through.
  #[serde(default)]
  pub prevent_return: bool,
  /// Splice the nested output back into the original input.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub set_accessor: Option<Accessor>,
  /// Stage-scoped redirection rules, merged over the calling thread's
  /// ambient customization.
  #[serde(default, skip_serializing_if = "Customization::is_empty")]
  pub customization: Customization,
}
