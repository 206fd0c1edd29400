//! Tests for fire-signal and push-to-context stages, select type
//! inference, and diagnostic record emission.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cadence_engine::{
  Actor, ActorError, ActorProvider, CallArgument, ChannelDiagnostics, DiagnosticLogger,
  Direction, EngineServices, ExecutionContext, InMemoryMethodCatalog, InMemorySequenceCatalog,
  MethodSpec, NoopDiagnostics, ParamBinding, SequenceEngine, SignalError, SignalPublisher,
  SignalTarget, StepValue,
};
use cadence_sequence::{
  Accessor, CallStage, FireSignalStage, PushToContextStage, SelectStage, Sequence,
  StageDefinition, StageKind, TypeTag,
};
use serde_json::json;
use tokio::sync::mpsc;
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

/// Records every publish for assertion.
#[derive(Default)]
struct CollectingSignals {
  fired: Mutex<Vec<(SignalTarget, serde_json::Value)>>,
}

#[async_trait]
impl SignalPublisher for CollectingSignals {
  async fn fire(
    &self,
    target: &SignalTarget,
    payload: serde_json::Value,
    _cancel: CancellationToken,
  ) -> Result<(), SignalError> {
    self.fired.lock().unwrap().push((target.clone(), payload));
    Ok(())
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

fn engine_with(
  signals: Arc<dyn SignalPublisher>,
  diagnostics: Arc<dyn DiagnosticLogger>,
  actors: Arc<dyn ActorProvider>,
  methods: InMemoryMethodCatalog,
) -> SequenceEngine {
  let services = EngineServices {
    actors,
    diagnostics,
    signals,
  };
  SequenceEngine::new(
    services,
    Arc::new(InMemorySequenceCatalog::new()),
    Arc::new(methods),
  )
}

fn signal_engine(signals: Arc<dyn SignalPublisher>) -> SequenceEngine {
  engine_with(
    signals,
    Arc::new(NoopDiagnostics),
    Arc::new(NoActors),
    InMemoryMethodCatalog::new(),
  )
}

fn fire_stage(stage_id: &str, fire: FireSignalStage) -> StageDefinition {
  StageDefinition {
    stage_id: stage_id.to_string(),
    input_type: TypeTag::Any,
    output_type: TypeTag::Any,
    kind: StageKind::FireSignal(fire),
  }
}

fn push_stage(stage_id: &str, push: PushToContextStage) -> StageDefinition {
  StageDefinition {
    stage_id: stage_id.to_string(),
    input_type: TypeTag::Any,
    output_type: TypeTag::Any,
    kind: StageKind::PushToContext(push),
  }
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

fn test_sequence(stages: Vec<StageDefinition>) -> Sequence {
  Sequence {
    sequence_id: "signals".to_string(),
    name: "Signals".to_string(),
    stages,
  }
}

#[tokio::test]
async fn fires_one_signal_and_passes_the_input_through() {
  let signals = Arc::new(CollectingSignals::default());
  let engine = signal_engine(signals.clone());

  let sequence = test_sequence(vec![fire_stage(
    "announce",
    FireSignalStage {
      signal_id: Some("sig-1".to_string()),
      signal_name: None,
      accessor: Some(Accessor::parse("event").unwrap()),
      multi: false,
    },
  )]);

  let input = json!({ "event": { "kind": "created" }, "other": 1 });
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(input.clone()),
      ExecutionContext::new("flow-signal"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);
  assert_eq!(outcome.output, StepValue::Value(input));

  let fired = signals.fired.lock().unwrap();
  assert_eq!(fired.len(), 1);
  assert_eq!(fired[0].0, SignalTarget::Id("sig-1".to_string()));
  assert_eq!(fired[0].1, json!({ "kind": "created" }));
}

#[tokio::test]
async fn multi_mode_fires_one_signal_per_element() {
  let signals = Arc::new(CollectingSignals::default());
  let engine = signal_engine(signals.clone());

  let sequence = test_sequence(vec![fire_stage(
    "announce",
    FireSignalStage {
      signal_id: None,
      signal_name: Some("item-seen".to_string()),
      accessor: None,
      multi: true,
    },
  )]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!([1, 2, 3])),
      ExecutionContext::new("flow-signal-multi"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);

  let fired = signals.fired.lock().unwrap();
  assert_eq!(fired.len(), 3);
  for (target, _) in fired.iter() {
    assert_eq!(*target, SignalTarget::Name("item-seen".to_string()));
  }
  let payloads: Vec<&serde_json::Value> = fired.iter().map(|(_, p)| p).collect();
  assert_eq!(payloads, vec![&json!(1), &json!(2), &json!(3)]);
}

#[tokio::test]
async fn a_signal_transport_failure_fails_the_stage() {
  let engine = signal_engine(Arc::new(NoSignals));

  let sequence = test_sequence(vec![fire_stage(
    "announce",
    FireSignalStage {
      signal_id: Some("sig-1".to_string()),
      signal_name: None,
      accessor: None,
      multi: false,
    },
  )]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({})),
      ExecutionContext::new("flow-signal-fail"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("signal"));
}

#[tokio::test]
async fn pushed_values_are_visible_to_later_call_stages() {
  struct ContextReadingActor;

  #[async_trait]
  impl Actor for ContextReadingActor {
    async fn invoke(
      &self,
      _method: &str,
      args: Vec<CallArgument>,
      _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ActorError> {
      for arg in args {
        if let CallArgument::Context(context) = arg {
          return context
            .side_value("tenant")
            .ok_or_else(|| ActorError::new("tenant not attached"));
        }
      }
      Err(ActorError::new("no context argument"))
    }
  }

  struct ContextReadingActors;

  #[async_trait]
  impl ActorProvider for ContextReadingActors {
    async fn resolve(
      &self,
      _actor_type: &str,
      _input: &StepValue,
      _context: &ExecutionContext,
    ) -> Result<Arc<dyn Actor>, ActorError> {
      Ok(Arc::new(ContextReadingActor))
    }
  }

  let methods = InMemoryMethodCatalog::new();
  methods.register("test.service", MethodSpec::new("read", vec![ParamBinding::Context]));
  let engine = engine_with(
    Arc::new(NoSignals),
    Arc::new(NoopDiagnostics),
    Arc::new(ContextReadingActors),
    methods,
  );

  let sequence = test_sequence(vec![
    push_stage(
      "stash",
      PushToContextStage {
        key: "tenant".to_string(),
        accessor: Some(Accessor::parse("tenant").unwrap()),
        override_existing: false,
      },
    ),
    StageDefinition {
      stage_id: "read-back".to_string(),
      input_type: TypeTag::Any,
      output_type: TypeTag::Any,
      kind: StageKind::Call(CallStage {
        actor_type: "test.service".to_string(),
        method: "read".to_string(),
        configuration: None,
      }),
    },
  ]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "tenant": "acme" })),
      ExecutionContext::new("flow-push-read"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);
  assert_eq!(outcome.output, StepValue::Value(json!("acme")));
}

#[tokio::test]
async fn pushing_an_existing_key_without_override_fails() {
  let engine = signal_engine(Arc::new(NoSignals));

  let push = |id: &str| {
    push_stage(
      id,
      PushToContextStage {
        key: "tenant".to_string(),
        accessor: Some(Accessor::parse("tenant").unwrap()),
        override_existing: false,
      },
    )
  };
  let sequence = test_sequence(vec![push("stash"), push("stash-again")]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "tenant": "acme" })),
      ExecutionContext::new("flow-push-dup"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("context_attach"));
}

#[tokio::test]
async fn pushing_an_existing_key_with_override_succeeds() {
  let engine = signal_engine(Arc::new(NoSignals));

  let sequence = test_sequence(vec![
    push_stage(
      "stash",
      PushToContextStage {
        key: "tenant".to_string(),
        accessor: Some(Accessor::parse("tenant").unwrap()),
        override_existing: false,
      },
    ),
    push_stage(
      "stash-again",
      PushToContextStage {
        key: "tenant".to_string(),
        accessor: Some(Accessor::parse("tenant").unwrap()),
        override_existing: true,
      },
    ),
  ]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "tenant": "acme" })),
      ExecutionContext::new("flow-push-override"),
    )
    .await;

  assert!(outcome.succeeded, "error: {:?}", outcome.error);
}

#[tokio::test]
async fn pushing_a_resolved_null_is_fatal() {
  let engine = signal_engine(Arc::new(NoSignals));

  let sequence = test_sequence(vec![push_stage(
    "stash",
    PushToContextStage {
      key: "tenant".to_string(),
      accessor: Some(Accessor::parse("tenant").unwrap()),
      override_existing: false,
    },
  )]);

  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "tenant": null })),
      ExecutionContext::new("flow-push-null"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("context_attach"));
}

#[tokio::test]
async fn select_infers_the_type_when_the_declared_output_is_any() {
  let engine = signal_engine(Arc::new(NoSignals));

  let sequence = test_sequence(vec![select_stage("pick", "items", TypeTag::Any)]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "items": [1, 2] })),
      ExecutionContext::new("flow-select-infer"),
    )
    .await;

  assert!(outcome.succeeded);
  assert_eq!(outcome.output, StepValue::Value(json!([1, 2])));
}

#[tokio::test]
async fn an_unresolvable_select_path_fails_the_stage() {
  let engine = signal_engine(Arc::new(NoSignals));

  let sequence = test_sequence(vec![select_stage("pick", "ghost", TypeTag::Any)]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "n": 1 })),
      ExecutionContext::new("flow-select-missing"),
    )
    .await;

  assert!(!outcome.succeeded);
  assert_eq!(outcome.error_code.as_deref(), Some("accessor"));
}

#[tokio::test]
async fn stage_boundaries_emit_diagnostic_records() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let engine = engine_with(
    Arc::new(NoSignals),
    Arc::new(ChannelDiagnostics::new(tx)),
    Arc::new(NoActors),
    InMemoryMethodCatalog::new(),
  );

  let sequence = test_sequence(vec![select_stage("pick", "n", TypeTag::Integer)]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "n": 7 })),
      ExecutionContext::new("flow-diag"),
    )
    .await;
  assert!(outcome.succeeded);

  let mut records = Vec::new();
  while let Ok(record) = rx.try_recv() {
    records.push(record);
  }

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].stage_id, "pick");
  assert_eq!(records[0].direction, Direction::In);
  assert_eq!(records[0].flow_id, "flow-diag");
  assert_eq!(records[0].payload, Some(json!({ "n": 7 })));
  assert_eq!(records[0].payload_type.as_deref(), Some("any"));
  assert_eq!(records[1].direction, Direction::Out);
  assert_eq!(records[1].payload, Some(json!(7)));
  assert_eq!(records[1].payload_type.as_deref(), Some("integer"));
}

#[tokio::test]
async fn the_out_record_carries_the_inferred_output_type() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let engine = engine_with(
    Arc::new(NoSignals),
    Arc::new(ChannelDiagnostics::new(tx)),
    Arc::new(NoActors),
    InMemoryMethodCatalog::new(),
  );

  // Declared Any: the Out record gets the tag inferred from the value
  let sequence = test_sequence(vec![select_stage("pick", "items", TypeTag::Any)]);
  let outcome = engine
    .run(
      &sequence,
      StepValue::Value(json!({ "items": [1, 2] })),
      ExecutionContext::new("flow-diag-infer"),
    )
    .await;
  assert!(outcome.succeeded);

  let mut records = Vec::new();
  while let Ok(record) = rx.try_recv() {
    records.push(record);
  }

  assert_eq!(records.len(), 2);
  assert_eq!(records[1].direction, Direction::Out);
  assert_eq!(records[1].payload_type.as_deref(), Some("array<integer>"));
}
