//! Cadence Sequence
//!
//! This crate provides the immutable data model for cadence pipelines.
//! A *sequence* is a named, ordered list of stage definitions; a *stage*
//! describes one pipeline node (call an actor, filter a collection, fan
//! out over a collection, fire a signal, push side-channel context,
//! project a value, or call a nested sequence).
//!
//! Definitions are authored once, serialized for storage/transport, and
//! executed many times - possibly on different engine instances - so
//! everything here round-trips losslessly through serde and is never
//! mutated at run time.

mod accessor;
mod condition;
mod customization;
mod error;
mod sequence;
mod stage;
mod types;

pub use accessor::{Accessor, Segment};
pub use condition::{CompareOp, CompiledCondition, Condition, Operand};
pub use customization::Customization;
pub use error::DefinitionError;
pub use sequence::Sequence;
pub use stage::{
  CallStage, FilterStage, FireSignalStage, ForeachStage, NestedSequenceCallStage,
  PushToContextStage, SelectStage, StageDefinition, StageKind, StageVariant,
};
pub use types::{TypePair, TypeTag};
