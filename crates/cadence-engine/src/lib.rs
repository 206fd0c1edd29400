//! Cadence Engine
//!
//! The stage execution engine: turns a static [`Sequence`] definition
//! into a running, possibly-parallel execution.
//!
//! The runtime unit is the *execution thread* - one lineage of stage
//! executions sharing a flow id. A [`ThreadOrchestrator`] owns one
//! thread and advances it stage by stage, dispatching each stage to its
//! handler through the [`StageHandlerRegistry`]. Fan-out stages fork
//! inner threads and register an explicit [`PostProcess`] continuation
//! that the orchestrator interprets once every forked thread reaches a
//! terminal state.
//!
//! External collaborators (the actor runtime, signal delivery, the
//! diagnostic sink, and sequence storage) are trait contracts; the
//! engine ships in-memory and no-op implementations for the ones tests
//! and embedders commonly need.
//!
//! [`Sequence`]: cadence_sequence::Sequence

mod actor;
mod catalog;
mod context;
mod diagnostics;
mod engine;
mod error;
mod handler;
mod handlers;
mod method;
mod orchestrator;
mod registry;
mod signal;
mod thread;
mod value;

pub use actor::{Actor, ActorError, ActorProvider, CallArgument};
pub use catalog::{InMemorySequenceCatalog, SequenceCatalog, SequenceOutcome, SequenceRunner};
pub use context::ExecutionContext;
pub use diagnostics::{
  ChannelDiagnostics, DiagnosticLogger, DiagnosticRecord, Direction, NoopDiagnostics,
  TracingDiagnostics,
};
pub use engine::{EngineServices, SequenceEngine};
pub use error::EngineError;
pub use handler::{PostProcess, StageHandler, StageScope, StageStep};
pub use handlers::{
  CallHandler, FilterHandler, FireSignalHandler, ForeachHandler, NestedSequenceCallHandler,
  PushToContextHandler, SelectHandler,
};
pub use method::{ConfigValidator, InMemoryMethodCatalog, MethodCatalog, MethodSpec, ParamBinding};
pub use orchestrator::{ThreadControl, ThreadOrchestrator};
pub use registry::StageHandlerRegistry;
pub use signal::{SignalError, SignalPublisher, SignalTarget};
pub use thread::{ChildThread, ThreadOutcome, ThreadState};
pub use value::StepValue;
