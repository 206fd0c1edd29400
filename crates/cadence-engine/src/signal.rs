//! The signal publish contract.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The target of a signal publish, by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalTarget {
  Id(String),
  Name(String),
}

impl std::fmt::Display for SignalTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SignalTarget::Id(id) => write!(f, "id:{}", id),
      SignalTarget::Name(name) => write!(f, "name:{}", name),
    }
  }
}

/// A failure reported by the signal transport.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SignalError {
  pub message: String,
}

impl SignalError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Distributed signal delivery, external to the engine.
#[async_trait]
pub trait SignalPublisher: Send + Sync {
  async fn fire(
    &self,
    target: &SignalTarget,
    payload: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<(), SignalError>;
}
