//! The thread orchestrator.
//!
//! An orchestrator owns one execution thread's lifecycle: it advances
//! the thread stage by stage in declared order, dispatches each stage
//! to its handler, spawns and joins forked inner threads for fan-out
//! stages, and interprets post-process continuations once deferred
//! work is terminal. Thread state is mutated exclusively here;
//! cross-thread interaction happens only through the fork/join
//! channel.

use std::sync::Arc;

use cadence_sequence::{Customization, StageDefinition, TypeTag};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::catalog::SequenceRunner;
use crate::context::ExecutionContext;
use crate::diagnostics::{self, Direction};
use crate::engine::EngineServices;
use crate::error::EngineError;
use crate::handler::{PostProcess, StageScope, StageStep};
use crate::registry::StageHandlerRegistry;
use crate::thread::{ChildThread, ThreadOutcome, ThreadState};
use crate::value::StepValue;

/// Fork/join and post-process state a handler may touch through its
/// scope.
#[derive(Default)]
pub struct ThreadControl {
  fork: Option<ForkSet>,
  post_process: Option<PostProcess>,
}

/// The inner threads registered at a fork point, awaiting join.
pub(crate) struct ForkSet {
  pub stage_id: String,
  pub children: Vec<ChildThread>,
}

impl ThreadControl {
  /// True while forked inner threads are registered and not yet
  /// joined. A foreach stage must not be re-entered in this state.
  pub fn has_outstanding_fork(&self) -> bool {
    self.fork.is_some()
  }

  /// Register forked inner threads on the owning thread.
  pub fn set_inner_threads(&mut self, stage_id: impl Into<String>, children: Vec<ChildThread>) {
    self.fork = Some(ForkSet {
      stage_id: stage_id.into(),
      children,
    });
  }

  /// Register the continuation to run once deferred work is terminal.
  pub fn register_post_process(&mut self, post_process: PostProcess) {
    self.post_process = Some(post_process);
  }

  pub(crate) fn take_fork(&mut self) -> Option<ForkSet> {
    self.fork.take()
  }

  pub(crate) fn take_post_process(&mut self) -> Option<PostProcess> {
    self.post_process.take()
  }
}

/// Drives one execution thread to a terminal state.
pub struct ThreadOrchestrator {
  state: ThreadState,
  context: ExecutionContext,
  stages: Arc<[StageDefinition]>,
  registry: Arc<StageHandlerRegistry>,
  services: Arc<EngineServices>,
  runner: Arc<dyn SequenceRunner>,
  customization: Customization,
  control: ThreadControl,
}

impl ThreadOrchestrator {
  /// Create an orchestrator for a root thread.
  pub fn new(
    stages: Arc<[StageDefinition]>,
    input: StepValue,
    context: ExecutionContext,
    registry: Arc<StageHandlerRegistry>,
    services: Arc<EngineServices>,
    runner: Arc<dyn SequenceRunner>,
    customization: Customization,
  ) -> Self {
    let state = ThreadState::root(&context, input);
    Self {
      state,
      context,
      stages,
      registry,
      services,
      runner,
      customization,
      control: ThreadControl::default(),
    }
  }

  fn from_child(&self, child: ChildThread) -> Self {
    Self {
      state: child.state,
      context: child.context,
      stages: child.stages,
      registry: Arc::clone(&self.registry),
      services: Arc::clone(&self.services),
      runner: Arc::clone(&self.runner),
      customization: self.customization.clone(),
      control: ThreadControl::default(),
    }
  }

  /// Run the thread to its terminal state.
  ///
  /// Stages execute strictly in declared order; cancellation is
  /// checked before every stage; the first error terminates the
  /// thread. Errors are never retried here.
  pub async fn run(mut self) -> ThreadState {
    info!(
      flow_id = %self.state.flow_id,
      execution_id = %self.state.execution_id,
      "thread_started"
    );

    let stages = Arc::clone(&self.stages);
    while self.state.stage_index < stages.len() {
      if self.context.is_cancelled() {
        warn!(
          flow_id = %self.state.flow_id,
          execution_id = %self.state.execution_id,
          "thread_cancelled"
        );
        self.state.outcome = Some(ThreadOutcome::Cancelled);
        return self.state;
      }

      let stage = &stages[self.state.stage_index];
      match self.step(stage).await {
        Ok(()) => {
          self.state.stage_index += 1;
        }
        Err(e) if e.is_cancellation() => {
          warn!(
            flow_id = %self.state.flow_id,
            execution_id = %self.state.execution_id,
            stage_id = %stage.stage_id,
            "thread_cancelled"
          );
          self.state.outcome = Some(ThreadOutcome::Cancelled);
          return self.state;
        }
        Err(e) => {
          error!(
            flow_id = %self.state.flow_id,
            execution_id = %self.state.execution_id,
            stage_id = %stage.stage_id,
            error = %e,
            "thread_failed"
          );
          self.emit_stage(&stage.stage_id, Direction::Out, None, None, Some(&e.to_string()));
          self.state.outcome = Some(ThreadOutcome::Failed(e));
          return self.state;
        }
      }
    }

    info!(
      flow_id = %self.state.flow_id,
      execution_id = %self.state.execution_id,
      "thread_completed"
    );
    self.state.outcome = Some(ThreadOutcome::Completed);
    self.state
  }

  /// Execute one stage and fold its result into the thread state.
  async fn step(&mut self, stage: &StageDefinition) -> Result<(), EngineError> {
    debug!(
      execution_id = %self.state.execution_id,
      stage_id = %stage.stage_id,
      stage_index = self.state.stage_index,
      "stage_started"
    );

    let input = self.state.input.clone();
    if let Some(value) = input.as_value() {
      if !stage.input_type.matches(value) {
        return Err(EngineError::TypeMismatch {
          stage_id: stage.stage_id.clone(),
          expected: stage.input_type.to_string(),
          actual: TypeTag::infer(value).to_string(),
        });
      }
    }

    self.emit_stage(
      &stage.stage_id,
      Direction::In,
      input.as_value(),
      Some(&stage.input_type),
      None,
    );

    let handler = self.registry.resolve(stage)?;
    let step = {
      let mut scope = StageScope {
        context: &self.context,
        services: self.services.as_ref(),
        runner: self.runner.as_ref(),
        customization: &self.customization,
        thread: &mut self.control,
      };
      handler.execute(stage, input, &mut scope).await?
    };

    // A fork or a registered continuation supersedes the handler's
    // immediate output.
    let step = if let Some(fork) = self.control.take_fork() {
      let joined = self.join_fork(fork).await?;
      let post = self
        .control
        .take_post_process()
        .ok_or_else(|| EngineError::Join {
          message: format!(
            "stage '{}' forked without registering a post-process",
            stage.stage_id
          ),
        })?;
      self.interpret(post, Some(joined))?
    } else if let Some(post) = self.control.take_post_process() {
      self.interpret(post, None)?
    } else {
      step
    };

    if let Some(value) = step.output.as_value() {
      if !stage.output_type.matches(value) {
        return Err(EngineError::TypeMismatch {
          stage_id: stage.stage_id.clone(),
          expected: stage.output_type.to_string(),
          actual: TypeTag::infer(value).to_string(),
        });
      }
    }

    // The Out record carries the step's effective output type, which
    // may be narrower than the declared one (Select inference, foreach
    // splices).
    self.emit_stage(
      &stage.stage_id,
      Direction::Out,
      step.output.as_value(),
      Some(&step.output_type),
      None,
    );

    debug!(
      execution_id = %self.state.execution_id,
      stage_id = %stage.stage_id,
      "stage_ended"
    );

    self.state.output = step.output;
    self.state.input = self.state.output.clone();
    Ok(())
  }

  /// Join all forked inner threads of one fork point.
  ///
  /// Children run concurrently and independently, each driven by its
  /// own orchestrator; they report their terminal state over a
  /// channel, and the barrier releases only once every child has
  /// reported. Returned states are in input order.
  ///
  /// Returns a boxed future so `Send` is part of the signature;
  /// otherwise the run -> join_fork -> run recursion leaves the
  /// compiler unable to resolve the spawned future's `Send` bound.
  fn join_fork(
    &self,
    fork: ForkSet,
  ) -> futures::future::BoxFuture<'_, Result<Vec<ThreadState>, EngineError>> {
    Box::pin(async move {
    let total = fork.children.len();
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ThreadState)>();

    for (index, child) in fork.children.into_iter().enumerate() {
      let orchestrator = self.from_child(child);
      let tx = tx.clone();
      tokio::spawn(async move {
        let state = orchestrator.run().await;
        // Ignore send errors - the parent only goes away if it was
        // itself torn down, in which case nobody joins.
        let _ = tx.send((index, state));
      });
    }
    drop(tx);

    let mut slots: Vec<Option<ThreadState>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut received = 0usize;
    while let Some((index, state)) = rx.recv().await {
      slots[index] = Some(state);
      received += 1;
    }

    if received != total {
      return Err(EngineError::Join {
        message: format!(
          "foreach stage '{}': {} of {} forked threads vanished before reporting",
          fork.stage_id,
          total - received,
          total
        ),
      });
    }

    Ok(slots.into_iter().flatten().collect())
    })
  }

  /// Interpret a post-process continuation.
  fn interpret(
    &self,
    post: PostProcess,
    joined: Option<Vec<ThreadState>>,
  ) -> Result<StageStep, EngineError> {
    match post {
      PostProcess::AggregateForeach {
        stage_id,
        element_type,
        splice,
      } => {
        let joined = joined.ok_or_else(|| EngineError::Join {
          message: format!("stage '{}' aggregation ran before its fork", stage_id),
        })?;
        self.aggregate_foreach(stage_id, element_type, splice, joined)
      }
      PostProcess::AggregateNestedCall {
        stage_id,
        sequence_id,
        outcome,
        original_input,
        prevent_return,
        set_accessor,
      } => aggregate_nested_call(
        stage_id,
        sequence_id,
        outcome,
        original_input,
        prevent_return,
        set_accessor,
      ),
    }
  }

  /// Collect the outputs of joined inner threads into one collection.
  ///
  /// Any failed child fails the whole stage with an aggregate error
  /// carrying every child failure; a cancelled child cancels the
  /// stage. Output order matches input iteration order, and the
  /// explicit no-value sentinel is skipped.
  fn aggregate_foreach(
    &self,
    stage_id: String,
    element_type: TypeTag,
    splice: Option<(serde_json::Value, cadence_sequence::Accessor)>,
    joined: Vec<ThreadState>,
  ) -> Result<StageStep, EngineError> {
    let total = joined.len();
    let mut errors = Vec::new();
    let mut cancelled = false;
    let mut elements = Vec::new();

    for state in joined {
      match state.outcome {
        Some(ThreadOutcome::Failed(e)) => errors.push(e),
        Some(ThreadOutcome::Cancelled) => cancelled = true,
        Some(ThreadOutcome::Completed) => {
          if let StepValue::Value(value) = state.output {
            if !element_type.matches(&value) {
              errors.push(EngineError::TypeMismatch {
                stage_id: stage_id.clone(),
                expected: element_type.to_string(),
                actual: TypeTag::infer(&value).to_string(),
              });
            } else {
              elements.push(value);
            }
          }
        }
        None => errors.push(EngineError::Join {
          message: format!(
            "inner thread '{}' reported without a terminal outcome",
            state.execution_id
          ),
        }),
      }
    }

    if !errors.is_empty() {
      return Err(EngineError::Aggregate {
        stage_id,
        total,
        errors,
      });
    }
    if cancelled {
      return Err(EngineError::Cancelled);
    }

    let collection = serde_json::Value::Array(elements);
    match splice {
      Some((mut carried, accessor)) => {
        accessor
          .set(&mut carried, collection)
          .map_err(|source| EngineError::Accessor {
            stage_id: stage_id.clone(),
            source,
          })?;
        let tag = TypeTag::infer(&carried);
        Ok(StageStep::value(StepValue::Value(carried), tag))
      }
      None => Ok(StageStep::value(
        StepValue::Value(collection),
        TypeTag::array(element_type),
      )),
    }
  }

  fn emit_stage(
    &self,
    stage_id: &str,
    direction: Direction,
    payload: Option<&serde_json::Value>,
    payload_type: Option<&TypeTag>,
    error: Option<&str>,
  ) {
    diagnostics::emit(
      self.services.diagnostics.as_ref(),
      &self.context,
      stage_id,
      direction,
      || payload.cloned(),
      payload_type,
      error,
    );
  }
}

/// Fold a nested sequence run's outcome into the calling stage.
///
/// Cancellation and failure propagate as the stage's terminal state;
/// otherwise the nested output is spliced back into the original
/// input, discarded in favor of the original input, or returned raw,
/// per the stage's flags.
fn aggregate_nested_call(
  stage_id: String,
  sequence_id: String,
  outcome: crate::catalog::SequenceOutcome,
  original_input: StepValue,
  prevent_return: bool,
  set_accessor: Option<cadence_sequence::Accessor>,
) -> Result<StageStep, EngineError> {
  if outcome.cancelled {
    return Err(EngineError::Cancelled);
  }
  if !outcome.succeeded {
    return Err(EngineError::Nested {
      stage_id,
      sequence_id,
      error_code: outcome.error_code,
      message: outcome
        .error
        .unwrap_or_else(|| "nested sequence reported failure".to_string()),
    });
  }

  if let Some(accessor) = set_accessor {
    let mut carried = match original_input {
      StepValue::Value(value) => value,
      StepValue::None => {
        return Err(EngineError::Configuration {
          stage_id,
          message: "set accessor configured but the stage has no input to splice into".to_string(),
        });
      }
    };
    accessor
      .set(&mut carried, outcome.output.clone_or_null())
      .map_err(|source| EngineError::Accessor {
        stage_id: stage_id.clone(),
        source,
      })?;
    let tag = TypeTag::infer(&carried);
    return Ok(StageStep::value(StepValue::Value(carried), tag));
  }

  if prevent_return {
    let tag = match original_input.as_value() {
      Some(value) => TypeTag::infer(value),
      None => TypeTag::Any,
    };
    return Ok(StageStep::value(original_input, tag));
  }

  let tag = match outcome.output.as_value() {
    Some(value) => TypeTag::infer(value),
    None => TypeTag::Any,
  };
  Ok(StageStep::value(outcome.output, tag))
}
