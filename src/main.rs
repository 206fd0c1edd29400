use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use cadence_engine::{
  Actor, ActorError, ActorProvider, CallArgument, EngineServices, ExecutionContext,
  InMemoryMethodCatalog, InMemorySequenceCatalog, SequenceEngine, SignalError, SignalPublisher,
  SignalTarget, StepValue, TracingDiagnostics,
};
use cadence_sequence::Sequence;

/// Cadence - a typed sequence execution engine
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a sequence definition file
  Validate {
    /// Path to the sequence file (JSON)
    sequence_file: PathBuf,
  },

  /// Run a sequence against the built-in local services
  Run {
    /// Path to the sequence file (JSON)
    sequence_file: PathBuf,

    /// Flow id for log correlation (default: derived from the file name)
    #[arg(long)]
    flow_id: Option<String>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Validate { sequence_file }) => {
      validate_sequence(sequence_file)?;
    }
    Some(Commands::Run {
      sequence_file,
      flow_id,
    }) => {
      run_sequence(sequence_file, flow_id)?;
    }
    None => {
      println!("cadence - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_sequence(path: &PathBuf) -> Result<Sequence> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read sequence file: {}", path.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse sequence file: {}", path.display()))
}

fn validate_sequence(sequence_file: PathBuf) -> Result<()> {
  let sequence = load_sequence(&sequence_file)?;

  sequence
    .validate()
    .with_context(|| format!("sequence '{}' failed validation", sequence.sequence_id))?;

  println!(
    "sequence '{}' is valid ({} stages)",
    sequence.sequence_id,
    sequence.stages.len()
  );

  Ok(())
}

fn run_sequence(sequence_file: PathBuf, flow_id: Option<String>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_sequence_async(sequence_file, flow_id).await })
}

async fn run_sequence_async(sequence_file: PathBuf, flow_id: Option<String>) -> Result<()> {
  let sequence = load_sequence(&sequence_file)?;

  sequence
    .validate()
    .with_context(|| format!("sequence '{}' failed validation", sequence.sequence_id))?;

  eprintln!("Loaded sequence: {}", sequence.name);

  // Read input from stdin
  let input = read_input_from_stdin()?;
  eprintln!("Input: {}", input);

  // Register the sequence so nested calls back into it resolve
  let catalog = Arc::new(InMemorySequenceCatalog::new());
  catalog.register(sequence.clone());

  let services = EngineServices {
    actors: Arc::new(EchoActorProvider),
    diagnostics: Arc::new(TracingDiagnostics),
    signals: Arc::new(TracingSignals),
  };
  let engine = SequenceEngine::new(services, catalog, Arc::new(InMemoryMethodCatalog::new()));

  let flow_id = flow_id.unwrap_or_else(|| {
    sequence_file
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| "local".to_string())
  });
  let context = ExecutionContext::with_cancellation(flow_id, CancellationToken::new());

  let outcome = engine
    .run(&sequence, StepValue::Value(input), context)
    .await;

  if outcome.cancelled {
    anyhow::bail!("sequence execution was cancelled");
  }
  if !outcome.succeeded {
    anyhow::bail!(
      "sequence execution failed ({}): {}",
      outcome.error_code.as_deref().unwrap_or("unknown"),
      outcome.error.as_deref().unwrap_or("no detail"),
    );
  }

  eprintln!("Execution completed");

  // Print the final output as JSON
  match outcome.output.as_value() {
    Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
    None => println!("null"),
  }

  Ok(())
}

fn read_input_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    // Read from stdin
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read input from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse input JSON from stdin")
    }
  }
}

/// Actor provider for local runs: every call stage resolves to an echo
/// actor, so definitions can be exercised without an actor runtime.
struct EchoActorProvider;

#[async_trait::async_trait]
impl ActorProvider for EchoActorProvider {
  async fn resolve(
    &self,
    _actor_type: &str,
    _input: &StepValue,
    _context: &ExecutionContext,
  ) -> Result<Arc<dyn Actor>, ActorError> {
    Ok(Arc::new(EchoActor))
  }
}

struct EchoActor;

#[async_trait::async_trait]
impl Actor for EchoActor {
  async fn invoke(
    &self,
    method: &str,
    args: Vec<CallArgument>,
    _cancel: CancellationToken,
  ) -> Result<serde_json::Value, ActorError> {
    let values: Vec<serde_json::Value> = args
      .into_iter()
      .filter_map(|arg| match arg {
        CallArgument::Value(value) => Some(value),
        CallArgument::Context(_) => None,
      })
      .collect();

    Ok(serde_json::json!({ "method": method, "args": values }))
  }
}

/// Signal publisher for local runs: logs the publish and succeeds.
struct TracingSignals;

#[async_trait::async_trait]
impl SignalPublisher for TracingSignals {
  async fn fire(
    &self,
    target: &SignalTarget,
    payload: serde_json::Value,
    _cancel: CancellationToken,
  ) -> Result<(), SignalError> {
    tracing::info!(target = %target, payload = %payload, "signal_fired");
    Ok(())
  }
}
