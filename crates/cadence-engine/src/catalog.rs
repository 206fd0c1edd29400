//! Sequence storage and the recursive execution entry point.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cadence_sequence::{Customization, Sequence};

use crate::context::ExecutionContext;
use crate::value::StepValue;

/// The result a sequence run reports to its launcher.
#[derive(Debug)]
pub struct SequenceOutcome {
  pub succeeded: bool,
  pub cancelled: bool,
  pub error_code: Option<String>,
  pub error: Option<String>,
  pub output: StepValue,
}

impl SequenceOutcome {
  pub fn completed(output: StepValue) -> Self {
    Self {
      succeeded: true,
      cancelled: false,
      error_code: None,
      error: None,
      output,
    }
  }

  pub fn cancelled() -> Self {
    Self {
      succeeded: false,
      cancelled: true,
      error_code: Some("cancelled".to_string()),
      error: None,
      output: StepValue::None,
    }
  }

  pub fn failed(error_code: impl Into<String>, error: impl Into<String>) -> Self {
    Self {
      succeeded: false,
      cancelled: false,
      error_code: Some(error_code.into()),
      error: Some(error.into()),
      output: StepValue::None,
    }
  }
}

/// The recursive sequence-execution entry point.
///
/// Nested-sequence-call stages launch sub-sequences through this
/// contract; the engine itself implements it.
#[async_trait]
pub trait SequenceRunner: Send + Sync {
  async fn run_sequence(
    &self,
    sequence_id: &str,
    customization: &Customization,
    input: StepValue,
    parent: &ExecutionContext,
  ) -> SequenceOutcome;
}

/// Lookup of sequence definitions by id.
pub trait SequenceCatalog: Send + Sync {
  fn get(&self, sequence_id: &str) -> Option<Arc<Sequence>>;
}

/// An in-memory sequence catalog.
#[derive(Default)]
pub struct InMemorySequenceCatalog {
  sequences: RwLock<HashMap<String, Arc<Sequence>>>,
}

impl InMemorySequenceCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, sequence: Sequence) {
    let mut sequences = self.sequences.write().unwrap_or_else(|e| e.into_inner());
    sequences.insert(sequence.sequence_id.clone(), Arc::new(sequence));
  }
}

impl SequenceCatalog for InMemorySequenceCatalog {
  fn get(&self, sequence_id: &str) -> Option<Arc<Sequence>> {
    let sequences = self.sequences.read().unwrap_or_else(|e| e.into_inner());
    sequences.get(sequence_id).cloned()
  }
}
