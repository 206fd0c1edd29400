//! Method catalogs.
//!
//! The typed replacement for reflection-driven method resolution: a
//! catalog maps (actor type, method name) to an explicitly registered
//! [`MethodSpec`] describing the positional argument plan and any
//! validators to run against the stage's configuration before
//! invocation. The call handler caches resolved specs per stage id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cadence_sequence::TypeTag;

/// How one positional parameter of a method is filled.
#[derive(Clone)]
pub enum ParamBinding {
  /// The execution context, re-typed with the stage's configuration.
  Context,
  /// The current stage input, which must be assignable to the declared
  /// parameter type.
  Input { expected: TypeTag },
  /// A registered default value.
  Default { value: serde_json::Value },
}

/// A contract check run against the stage's configuration payload
/// before invocation. Returns a human-readable refusal on failure.
pub type ConfigValidator =
  Arc<dyn Fn(Option<&serde_json::Value>) -> Result<(), String> + Send + Sync>;

/// A registered method of an actor interface type.
#[derive(Clone)]
pub struct MethodSpec {
  pub name: String,
  pub params: Vec<ParamBinding>,
  pub validators: Vec<ConfigValidator>,
}

impl MethodSpec {
  pub fn new(name: impl Into<String>, params: Vec<ParamBinding>) -> Self {
    Self {
      name: name.into(),
      params,
      validators: Vec::new(),
    }
  }

  pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
    self.validators.push(validator);
    self
  }
}

/// Lookup of registered method specs.
pub trait MethodCatalog: Send + Sync {
  fn lookup(&self, actor_type: &str, method: &str) -> Option<Arc<MethodSpec>>;
}

/// An in-memory method catalog populated by explicit registration.
#[derive(Default)]
pub struct InMemoryMethodCatalog {
  methods: RwLock<HashMap<(String, String), Arc<MethodSpec>>>,
}

impl InMemoryMethodCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a method under an actor interface type.
  pub fn register(&self, actor_type: impl Into<String>, spec: MethodSpec) {
    let key = (actor_type.into(), spec.name.clone());
    let mut methods = self.methods.write().unwrap_or_else(|e| e.into_inner());
    methods.insert(key, Arc::new(spec));
  }
}

impl MethodCatalog for InMemoryMethodCatalog {
  fn lookup(&self, actor_type: &str, method: &str) -> Option<Arc<MethodSpec>> {
    let methods = self.methods.read().unwrap_or_else(|e| e.into_inner());
    methods
      .get(&(actor_type.to_string(), method.to_string()))
      .cloned()
  }
}
