//! Stage handlers, one per variant.

mod call;
mod filter;
mod fire_signal;
mod foreach;
mod nested_call;
mod push_to_context;
mod select;

pub use call::CallHandler;
pub use filter::FilterHandler;
pub use fire_signal::FireSignalHandler;
pub use foreach::ForeachHandler;
pub use nested_call::NestedSequenceCallHandler;
pub use push_to_context::PushToContextHandler;
pub use select::SelectHandler;

use crate::error::EngineError;

/// The dispatch invariant: a handler only ever sees its own variant.
pub(crate) fn wrong_variant(stage_id: &str, expected: &str) -> EngineError {
  EngineError::Configuration {
    stage_id: stage_id.to_string(),
    message: format!("stage variant does not match the {} handler", expected),
  }
}
