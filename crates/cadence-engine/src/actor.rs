//! The actor provider contract.
//!
//! A call stage asks the provider to resolve a callable target for its
//! declared actor interface type, then invokes a method on it. The
//! engine does not manage actor placement, activation, or persistence;
//! the provider may cache or redirect per its own policy.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::value::StepValue;

/// A failure reported by the actor provider or an invoked actor.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActorError {
  pub message: String,
}

impl ActorError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// One positional argument of an actor invocation.
///
/// Argument lists are built from the method's registered parameter
/// bindings: the (re-typed) execution context, the stage input where
/// assignable, or a registered default value.
#[derive(Debug, Clone)]
pub enum CallArgument {
  Context(ExecutionContext),
  Value(serde_json::Value),
}

/// A resolved callable target.
#[async_trait]
pub trait Actor: Send + Sync {
  async fn invoke(
    &self,
    method: &str,
    args: Vec<CallArgument>,
    cancel: CancellationToken,
  ) -> Result<serde_json::Value, ActorError>;
}

/// Resolves callable targets for call stages.
///
/// Must be safe to call repeatedly; failures propagate as stage
/// failures. A cancelled context never reaches the provider.
#[async_trait]
pub trait ActorProvider: Send + Sync {
  async fn resolve(
    &self,
    actor_type: &str,
    input: &StepValue,
    context: &ExecutionContext,
  ) -> Result<Arc<dyn Actor>, ActorError>;
}
