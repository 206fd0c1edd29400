//! The sequence engine.
//!
//! Top-level entry point: owns the handler registry, the external
//! service bundle, and the sequence catalog, and implements the
//! recursive [`SequenceRunner`] contract that nested-sequence-call
//! stages launch through.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_sequence::{Customization, Sequence, StageDefinition};
use tracing::{error, info, instrument, warn};

use crate::actor::ActorProvider;
use crate::catalog::{SequenceCatalog, SequenceOutcome, SequenceRunner};
use crate::context::ExecutionContext;
use crate::diagnostics::DiagnosticLogger;
use crate::error::EngineError;
use crate::method::MethodCatalog;
use crate::orchestrator::ThreadOrchestrator;
use crate::registry::StageHandlerRegistry;
use crate::signal::SignalPublisher;
use crate::thread::ThreadOutcome;
use crate::value::StepValue;

/// The external collaborators every execution needs.
pub struct EngineServices {
  pub actors: Arc<dyn ActorProvider>,
  pub diagnostics: Arc<dyn DiagnosticLogger>,
  pub signals: Arc<dyn SignalPublisher>,
}

struct EngineInner {
  registry: Arc<StageHandlerRegistry>,
  services: Arc<EngineServices>,
  catalog: Arc<dyn SequenceCatalog>,
}

/// The sequence execution engine. Cheap to clone; clones share the
/// registry, services, and catalog.
#[derive(Clone)]
pub struct SequenceEngine {
  inner: Arc<EngineInner>,
}

impl SequenceEngine {
  /// Create an engine with the default handler set.
  pub fn new(
    services: EngineServices,
    catalog: Arc<dyn SequenceCatalog>,
    methods: Arc<dyn MethodCatalog>,
  ) -> Self {
    Self::with_registry(services, catalog, StageHandlerRegistry::new(methods))
  }

  /// Create an engine with a caller-assembled registry.
  pub fn with_registry(
    services: EngineServices,
    catalog: Arc<dyn SequenceCatalog>,
    registry: StageHandlerRegistry,
  ) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        registry: Arc::new(registry),
        services: Arc::new(services),
        catalog,
      }),
    }
  }

  /// The handler registry, for resolution checks outside execution.
  pub fn registry(&self) -> &StageHandlerRegistry {
    &self.inner.registry
  }

  /// Execute a sequence for one flow.
  #[instrument(
    name = "sequence_execute",
    skip(self, sequence, input, context),
    fields(
      sequence_id = %sequence.sequence_id,
      flow_id = %context.flow_id(),
    )
  )]
  pub async fn run(
    &self,
    sequence: &Sequence,
    input: StepValue,
    context: ExecutionContext,
  ) -> SequenceOutcome {
    self
      .run_with_customization(sequence, Customization::default(), input, context)
      .await
  }

  /// Execute a sequence carrying ambient customization rules.
  pub async fn run_with_customization(
    &self,
    sequence: &Sequence,
    customization: Customization,
    input: StepValue,
    context: ExecutionContext,
  ) -> SequenceOutcome {
    info!(
      sequence_id = %sequence.sequence_id,
      flow_id = %context.flow_id(),
      execution_id = %context.execution_id(),
      "sequence_started"
    );

    let stages: Arc<[StageDefinition]> = sequence.stages.clone().into();
    let runner: Arc<dyn SequenceRunner> = Arc::new(self.clone());
    let orchestrator = ThreadOrchestrator::new(
      stages,
      input,
      context,
      Arc::clone(&self.inner.registry),
      Arc::clone(&self.inner.services),
      runner,
      customization,
    );

    let state = orchestrator.run().await;
    match state.outcome {
      Some(ThreadOutcome::Completed) => {
        info!(
          sequence_id = %sequence.sequence_id,
          execution_id = %state.execution_id,
          "sequence_completed"
        );
        SequenceOutcome::completed(state.output)
      }
      Some(ThreadOutcome::Cancelled) => {
        warn!(
          sequence_id = %sequence.sequence_id,
          execution_id = %state.execution_id,
          "sequence_cancelled"
        );
        SequenceOutcome::cancelled()
      }
      Some(ThreadOutcome::Failed(e)) => {
        error!(
          sequence_id = %sequence.sequence_id,
          execution_id = %state.execution_id,
          error = %e,
          "sequence_failed"
        );
        outcome_from_error(e)
      }
      None => SequenceOutcome::failed(
        "join",
        format!(
          "thread '{}' ended without a terminal outcome",
          state.execution_id
        ),
      ),
    }
  }
}

/// Map a terminal engine error to the outcome reported to launchers.
///
/// A nested failure keeps the error code it propagated, so recursion
/// does not flatten every failure into `nested_sequence_failed`.
fn outcome_from_error(error: EngineError) -> SequenceOutcome {
  let code = match &error {
    EngineError::Nested {
      error_code: Some(code),
      ..
    } => code.clone(),
    other => other.code().to_string(),
  };
  SequenceOutcome::failed(code, error.to_string())
}

#[async_trait]
impl SequenceRunner for SequenceEngine {
  async fn run_sequence(
    &self,
    sequence_id: &str,
    customization: &Customization,
    input: StepValue,
    parent: &ExecutionContext,
  ) -> SequenceOutcome {
    if parent.is_cancelled() {
      return SequenceOutcome::cancelled();
    }

    let resolved = customization.resolve(sequence_id);
    let Some(sequence) = self.inner.catalog.get(resolved) else {
      let e = EngineError::SequenceNotFound {
        sequence_id: resolved.to_string(),
      };
      return SequenceOutcome::failed(e.code(), e.to_string());
    };

    let context = parent.derive();
    self
      .run_with_customization(&sequence, customization.clone(), input, context)
      .await
  }
}
