//! Structured diagnostic records and sinks.
//!
//! The engine emits "stage started/ended" and "call in/out" records to
//! an abstract sink. A sink may have zero consumers, in which case the
//! engine skips payload materialization entirely - the record is never
//! built.

use cadence_sequence::TypeTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::context::ExecutionContext;

/// Whether a record marks the entry into or the exit out of a stage
/// body or actor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  In,
  Out,
}

/// A structured diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
  pub flow_id: String,
  pub execution_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_execution_id: Option<String>,
  pub stage_id: String,
  pub direction: Direction,
  pub timestamp: DateTime<Utc>,
  /// The typed payload crossing the stage boundary, when materialized.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payload: Option<serde_json::Value>,
  /// Display form of the payload's declared type.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payload_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Sink for diagnostic records.
///
/// Implementations decide what to do with records (persist, stream,
/// log, drop). `has_consumers` gates payload materialization: when it
/// returns `false` the engine does not build records at all.
pub trait DiagnosticLogger: Send + Sync {
  fn has_consumers(&self) -> bool {
    true
  }

  fn log(&self, record: DiagnosticRecord);
}

/// A sink that discards everything.
///
/// Reports no consumers, so the engine skips record construction.
#[derive(Debug, Clone, Default)]
pub struct NoopDiagnostics;

impl DiagnosticLogger for NoopDiagnostics {
  fn has_consumers(&self) -> bool {
    false
  }

  fn log(&self, _record: DiagnosticRecord) {
    // Intentionally empty
  }
}

/// A sink that forwards records to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingDiagnostics;

impl DiagnosticLogger for TracingDiagnostics {
  fn log(&self, record: DiagnosticRecord) {
    match &record.error {
      Some(error) => tracing::error!(
        flow_id = %record.flow_id,
        execution_id = %record.execution_id,
        stage_id = %record.stage_id,
        direction = ?record.direction,
        error = %error,
        "stage_diagnostic"
      ),
      None => tracing::info!(
        flow_id = %record.flow_id,
        execution_id = %record.execution_id,
        stage_id = %record.stage_id,
        direction = ?record.direction,
        payload = ?record.payload,
        "stage_diagnostic"
      ),
    }
  }
}

/// A sink that sends records to an unbounded channel.
///
/// Unbounded so a slow consumer never blocks the engine; record volume
/// is bounded by stage count, so growth stays small in practice.
#[derive(Debug, Clone)]
pub struct ChannelDiagnostics {
  sender: mpsc::UnboundedSender<DiagnosticRecord>,
}

impl ChannelDiagnostics {
  pub fn new(sender: mpsc::UnboundedSender<DiagnosticRecord>) -> Self {
    Self { sender }
  }
}

impl DiagnosticLogger for ChannelDiagnostics {
  fn log(&self, record: DiagnosticRecord) {
    // Ignore send errors - the receiver may have been dropped
    let _ = self.sender.send(record);
  }
}

/// Build and log one record, unless the sink has no consumers.
///
/// The payload closure only runs when a consumer exists, so an idle
/// sink costs one boolean check per boundary.
pub(crate) fn emit(
  logger: &dyn DiagnosticLogger,
  context: &ExecutionContext,
  stage_id: &str,
  direction: Direction,
  payload: impl FnOnce() -> Option<serde_json::Value>,
  payload_type: Option<&TypeTag>,
  error: Option<&str>,
) {
  if !logger.has_consumers() {
    return;
  }
  logger.log(DiagnosticRecord {
    flow_id: context.flow_id().to_string(),
    execution_id: context.execution_id().to_string(),
    parent_execution_id: context.parent_execution_id().map(str::to_string),
    stage_id: stage_id.to_string(),
    direction,
    timestamp: Utc::now(),
    payload: payload(),
    payload_type: payload_type.map(|t| t.to_string()),
    error: error.map(str::to_string),
  });
}
