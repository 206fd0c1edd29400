//! Tests for foreach fan-out: forked inner threads, aggregation, and
//! the fork/join invariants.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_engine::{
  Actor, ActorError, ActorProvider, CallArgument, EngineServices, ExecutionContext,
  ForeachHandler, InMemoryMethodCatalog, InMemorySequenceCatalog, MethodSpec, NoopDiagnostics,
  SequenceEngine, SequenceOutcome, SequenceRunner, SignalError, SignalPublisher, SignalTarget,
  StageHandler, StageScope, StepValue, ThreadControl,
};
use cadence_sequence::{
  Accessor, CallStage, Customization, ForeachStage, SelectStage, Sequence, StageDefinition,
  StageKind, TypeTag,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct NoActors;

#[async_trait]
impl ActorProvider for NoActors {
  async fn resolve(
    &self,
    _actor_type: &str,
    _input: &StepValue,
    _context: &ExecutionContext,
  ) -> Result<Arc<dyn Actor>, ActorError> {
    Err(ActorError::new("no actors configured"))
  }
}

struct NoSignals;

#[async_trait]
impl SignalPublisher for NoSignals {
  async fn fire(
    &self,
    _target: &SignalTarget,
    _payload: serde_json::Value,
    _cancel: CancellationToken,
  ) -> Result<(), SignalError> {
    Err(SignalError::new("no signals configured"))
  }
}

struct NoRunner;

#[async_trait]
impl SequenceRunner for NoRunner {
  async fn run_sequence(
    &self,
    _sequence_id: &str,
    _customization: &Customization,
    _input: StepValue,
    _parent: &ExecutionContext,
  ) -> SequenceOutcome {
    SequenceOutcome::failed("sequence_not_found", "no sequences registered")
  }
}

fn test_services() -> EngineServices {
  EngineServices {
    actors: Arc::new(NoActors),
    diagnostics: Arc::new(NoopDiagnostics),
    signals: Arc::new(NoSignals),
  }
}

fn test_engine() -> SequenceEngine {
  SequenceEngine::new(
    test_services(),
    Arc::new(InMemorySequenceCatalog::new()),
    Arc::new(InMemoryMethodCatalog::new()),
  )
}

fn select_stage(stage_id: &str, path: &str, output_type: TypeTag) -> StageDefinition {
  StageDefinition {
    stage_id: stage_id.to_string(),
    input_type: TypeTag::Any,
    output_type,
    kind: StageKind::Select(SelectStage {
      accessor: Accessor::parse(path).unwrap(),
    }),
  }
}

fn foreach_stage(
  stage_id: &str,
  element_type: TypeTag,
  body: Vec<StageDefinition>,
  source_accessor: Option<&str>,
  set_accessor: Option<&str>,
) -> StageDefinition {
  let output_type = if set_accessor.is_some() {
    TypeTag::Object
  } else {
    TypeTag::array(element_type.clone())
  };
  StageDefinition {
    stage_id: stage_id.to_string(),
    input_type: TypeTag::Any,
    output_type,
    kind: StageKind::Foreach(ForeachStage {
      element_type,
      nested_flow_id: format!("{}-inner", stage_id),
      stages: body,
      source_accessor: source_accessor.map(|p| Accessor::parse(p).unwrap()),
      set_accessor: set_accessor.map(|p| Accessor::parse(p).unwrap()),
    }),
  }
}

fn test_sequence(stages: Vec<StageDefinition>) -> Sequence {
  Sequence {
    sequence_id: "walker".to_string(),
    name: "Walker".to_string(),
    stages,
  }
}

#[tokio::test]
async fn forks_one_thread_per_element_and_keeps_input_order() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    None,
    None,
  )]);
  let engine = test_engine();

  let input = json!([
    { "n": 1 }, { "n": 2 }, { "n": 3 }, { "n": 4 }, { "n": 5 }
  ]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(input),
      ExecutionContext::new("flow-walk"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);
  assert_eq!(outcome.output, StepValue::Value(json!([1, 2, 3, 4, 5])));
}

#[tokio::test]
async fn an_empty_collection_forks_nothing() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    None,
    None,
  )]);
  let engine = test_engine();

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!([])),
      ExecutionContext::new("flow-walk-empty"),
    )
    .await;

  assert!(outcome.succeeded);
  assert_eq!(outcome.output, StepValue::Value(json!([])));
}

#[tokio::test]
async fn splices_the_collection_back_into_the_carried_object() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    Some("items"),
    Some("items"),
  )]);
  let engine = test_engine();

  let input = json!({ "items": [{ "n": 1 }, { "n": 2 }], "total": 3 });
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(input),
      ExecutionContext::new("flow-walk-splice"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);
  assert_eq!(
    outcome.output,
    StepValue::Value(json!({ "items": [1, 2], "total": 3 }))
  );
}

#[tokio::test]
async fn an_empty_sourced_collection_splices_an_empty_array() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    Some("items"),
    Some("items"),
  )]);
  let engine = test_engine();

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "items": [], "total": 3 })),
      ExecutionContext::new("flow-walk-splice-empty"),
    )
    .await;

  assert!(outcome.succeeded);
  assert_eq!(
    outcome.output,
    StepValue::Value(json!({ "items": [], "total": 3 }))
  );
}

#[tokio::test]
async fn any_failed_inner_thread_fails_the_stage_with_an_aggregate() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    None,
    None,
  )]);
  let engine = test_engine();

  // The second element has no "n", so its inner thread fails
  let input = json!([{ "n": 1 }, { "m": 2 }, { "n": 3 }]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(input),
      ExecutionContext::new("flow-walk-partial"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("aggregate"));
}

#[tokio::test]
async fn all_failed_inner_threads_report_every_failure() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "missing", TypeTag::Integer)],
    None,
    None,
  )]);
  let engine = test_engine();

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!([{ "n": 1 }, { "n": 2 }])),
      ExecutionContext::new("flow-walk-all-fail"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("aggregate"));
  assert!(outcome.error.as_deref().unwrap().contains("2 of 2"));
}

#[tokio::test]
async fn element_outputs_must_match_the_declared_element_type() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Any)],
    None,
    None,
  )]);
  let engine = test_engine();

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!([{ "n": "not-a-number" }])),
      ExecutionContext::new("flow-walk-typed"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("aggregate"));
}

#[tokio::test]
async fn a_non_collection_input_is_a_type_mismatch() {
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    None,
    None,
  )]);
  let engine = test_engine();

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "n": 1 })),
      ExecutionContext::new("flow-walk-scalar"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("type_mismatch"));
}

#[tokio::test]
async fn inner_threads_observe_root_cancellation_through_derived_tokens() {
  // Each inner thread's call stage cancels the root token; every
  // forked thread then terminates as cancelled through its derived
  // token, and the cancellation - not an aggregate failure - folds
  // back into the stage.
  struct RootCancellingActor {
    root: CancellationToken,
  }

  #[async_trait]
  impl Actor for RootCancellingActor {
    async fn invoke(
      &self,
      _method: &str,
      _args: Vec<CallArgument>,
      _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ActorError> {
      self.root.cancel();
      Ok(serde_json::json!({ "n": 0 }))
    }
  }

  struct RootCancellingActors {
    root: CancellationToken,
  }

  #[async_trait]
  impl ActorProvider for RootCancellingActors {
    async fn resolve(
      &self,
      _actor_type: &str,
      _input: &StepValue,
      _context: &ExecutionContext,
    ) -> Result<Arc<dyn Actor>, ActorError> {
      Ok(Arc::new(RootCancellingActor {
        root: self.root.clone(),
      }))
    }
  }

  let methods = InMemoryMethodCatalog::new();
  methods.register("test.service", MethodSpec::new("halt", vec![]));

  let root = CancellationToken::new();
  let services = EngineServices {
    actors: Arc::new(RootCancellingActors { root: root.clone() }),
    diagnostics: Arc::new(NoopDiagnostics),
    signals: Arc::new(NoSignals),
  };
  let engine = SequenceEngine::new(
    services,
    Arc::new(InMemorySequenceCatalog::new()),
    Arc::new(methods),
  );

  let body = vec![
    StageDefinition {
      stage_id: "halt".to_string(),
      input_type: TypeTag::Any,
      output_type: TypeTag::Any,
      kind: StageKind::Call(CallStage {
        actor_type: "test.service".to_string(),
        method: "halt".to_string(),
        configuration: None,
      }),
    },
    select_stage("pick", "n", TypeTag::Integer),
  ];
  let sequence = test_sequence(vec![foreach_stage(
    "walk",
    TypeTag::Integer,
    body,
    None,
    None,
  )]);

  let context = ExecutionContext::with_cancellation("flow-walk-cancel", root);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!([{ "n": 1 }, { "n": 2 }, { "n": 3 }])),
      context,
    )
    .await;

  assert!(!outcome.succeeded);
  assert!(outcome.cancelled);
  assert_eq!(outcome.error_code.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn re_entering_an_outstanding_fork_is_an_invariant_violation() {
  let stage = foreach_stage(
    "walk",
    TypeTag::Integer,
    vec![select_stage("pick", "n", TypeTag::Integer)],
    None,
    None,
  );

  let services = test_services();
  let customization = Customization::default();
  let context = ExecutionContext::new("flow-reenter");
  let mut control = ThreadControl::default();
  control.set_inner_threads("walk", Vec::new());

  let mut scope = StageScope {
    context: &context,
    services: &services,
    runner: &NoRunner,
    customization: &customization,
    thread: &mut control,
  };

  let err = ForeachHandler
    .execute(&stage, StepValue::Value(json!([{ "n": 1 }])), &mut scope)
    .await
    .unwrap_err();
  assert_eq!(err.code(), "foreach_reentered");
}
