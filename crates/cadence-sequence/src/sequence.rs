//! Sequence definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::stage::{StageDefinition, StageKind};

/// A named, ordered list of stage definitions forming a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
  pub sequence_id: String,
  pub name: String,
  pub stages: Vec<StageDefinition>,
}

impl Sequence {
  /// Validate the definition before execution.
  ///
  /// Checks stage id uniqueness (recursively through foreach bodies),
  /// that the sequence is non-empty, and the static configuration
  /// requirements of each variant.
  pub fn validate(&self) -> Result<(), DefinitionError> {
    if self.stages.is_empty() {
      return Err(DefinitionError::EmptySequence {
        sequence_id: self.sequence_id.clone(),
      });
    }
    let mut seen = HashSet::new();
    self.validate_stages(&self.stages, &mut seen)
  }

  fn validate_stages<'a>(
    &self,
    stages: &'a [StageDefinition],
    seen: &mut HashSet<&'a str>,
  ) -> Result<(), DefinitionError> {
    for stage in stages {
      if !seen.insert(stage.stage_id.as_str()) {
        return Err(DefinitionError::DuplicateStageId {
          sequence_id: self.sequence_id.clone(),
          stage_id: stage.stage_id.clone(),
        });
      }
      match &stage.kind {
        StageKind::FireSignal(fire) => {
          if fire.signal_id.is_none() && fire.signal_name.is_none() {
            return Err(DefinitionError::MissingSignalTarget {
              stage_id: stage.stage_id.clone(),
            });
          }
        }
        StageKind::Foreach(foreach) => {
          self.validate_stages(&foreach.stages, seen)?;
        }
        _ => {}
      }
    }
    Ok(())
  }

  /// Get a stage by id, searching top-level stages only.
  pub fn get_stage(&self, stage_id: &str) -> Option<&StageDefinition> {
    self.stages.iter().find(|s| s.stage_id == stage_id)
  }
}
