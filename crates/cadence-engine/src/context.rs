//! Execution contexts.
//!
//! A context carries the flow identity of an execution tree, the
//! cancellation signal, an optional typed configuration payload, and
//! the side-channel store written by push-to-context stages.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cadence_sequence::TypeTag;
use tokio_util::sync::CancellationToken;

/// A side-channel entry: a value plus its inferred type.
#[derive(Debug, Clone)]
pub struct SideEntry {
  pub tag: TypeTag,
  pub value: serde_json::Value,
}

/// Ambient execution identity for one thread.
///
/// The flow id is invariant across an entire execution tree; the
/// execution id is unique per thread and never reused. Cancellation is
/// monotonic: derived contexts hold child tokens, so cancelling a
/// parent reaches every descendant.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  flow_id: String,
  execution_id: String,
  parent_execution_id: Option<String>,
  cancel: CancellationToken,
  configuration: Option<serde_json::Value>,
  side_channel: Arc<RwLock<HashMap<String, SideEntry>>>,
}

impl ExecutionContext {
  /// Create a root context for a new flow.
  pub fn new(flow_id: impl Into<String>) -> Self {
    Self::with_cancellation(flow_id, CancellationToken::new())
  }

  /// Create a root context observing an external cancellation token.
  pub fn with_cancellation(flow_id: impl Into<String>, cancel: CancellationToken) -> Self {
    Self {
      flow_id: flow_id.into(),
      execution_id: uuid::Uuid::new_v4().to_string(),
      parent_execution_id: None,
      cancel,
      configuration: None,
      side_channel: Arc::new(RwLock::new(HashMap::new())),
    }
  }

  pub fn flow_id(&self) -> &str {
    &self.flow_id
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn parent_execution_id(&self) -> Option<&str> {
    self.parent_execution_id.as_deref()
  }

  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn configuration(&self) -> Option<&serde_json::Value> {
    self.configuration.as_ref()
  }

  /// Duplicate this context with a different configuration payload.
  ///
  /// Identity, cancellation, and the side channel are shared; only the
  /// configuration changes. Used by call stages to attach stage-scoped
  /// configuration for one invocation.
  pub fn duplicate_with_config(&self, configuration: Option<serde_json::Value>) -> Self {
    Self {
      flow_id: self.flow_id.clone(),
      execution_id: self.execution_id.clone(),
      parent_execution_id: self.parent_execution_id.clone(),
      cancel: self.cancel.clone(),
      configuration,
      side_channel: Arc::clone(&self.side_channel),
    }
  }

  /// Produce a linked child context for nested or parallel work.
  ///
  /// The child gets a fresh execution id, this context as its parent,
  /// a child cancellation token, and shared side-channel data.
  pub fn derive(&self) -> Self {
    Self {
      flow_id: self.flow_id.clone(),
      execution_id: uuid::Uuid::new_v4().to_string(),
      parent_execution_id: Some(self.execution_id.clone()),
      cancel: self.cancel.child_token(),
      configuration: self.configuration.clone(),
      side_channel: Arc::clone(&self.side_channel),
    }
  }

  /// Attach a value to the side channel.
  ///
  /// Returns `false` when the key is already present and
  /// `override_existing` is not set; the value is left unchanged.
  pub fn attach(
    &self,
    key: &str,
    tag: TypeTag,
    value: serde_json::Value,
    override_existing: bool,
  ) -> bool {
    let mut channel = self
      .side_channel
      .write()
      .unwrap_or_else(|e| e.into_inner());
    if channel.contains_key(key) && !override_existing {
      return false;
    }
    channel.insert(key.to_string(), SideEntry { tag, value });
    true
  }

  /// Read a side-channel value by key.
  pub fn side_value(&self, key: &str) -> Option<serde_json::Value> {
    let channel = self.side_channel.read().unwrap_or_else(|e| e.into_inner());
    channel.get(key).map(|entry| entry.value.clone())
  }

  /// Read a side-channel entry (value and inferred type) by key.
  pub fn side_entry(&self, key: &str) -> Option<SideEntry> {
    let channel = self.side_channel.read().unwrap_or_else(|e| e.into_inner());
    channel.get(key).cloned()
  }
}
