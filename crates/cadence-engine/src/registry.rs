//! Stage handler resolution.
//!
//! The registry maps a stage definition to the handler responsible for
//! it. Simple variants dispatch through a fixed table installed at
//! construction time. The filter variant is generic over its
//! (collection, item) type pair: the concrete handler is built on
//! first use and cached under the pair, with a shared read pass and an
//! exclusive-lock re-check before construction so racing lookups never
//! build twice.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cadence_sequence::{StageDefinition, StageKind, StageVariant, TypePair};

use crate::error::EngineError;
use crate::handler::StageHandler;
use crate::handlers::{
  CallHandler, FilterHandler, FireSignalHandler, ForeachHandler, NestedSequenceCallHandler,
  PushToContextHandler, SelectHandler,
};
use crate::method::MethodCatalog;

type FilterFactory = Arc<dyn Fn(TypePair) -> Arc<dyn StageHandler> + Send + Sync>;

/// Maps stage definitions to stage handlers.
pub struct StageHandlerRegistry {
  fixed: HashMap<StageVariant, Arc<dyn StageHandler>>,
  filter_factory: Option<FilterFactory>,
  filters: RwLock<HashMap<TypePair, Arc<dyn StageHandler>>>,
}

impl StageHandlerRegistry {
  /// A registry with the full default handler set installed.
  pub fn new(methods: Arc<dyn MethodCatalog>) -> Self {
    let mut registry = Self::empty();
    registry.install(StageVariant::Call, Arc::new(CallHandler::new(methods)));
    registry.install(StageVariant::Foreach, Arc::new(ForeachHandler));
    registry.install(StageVariant::FireSignal, Arc::new(FireSignalHandler));
    registry.install(StageVariant::PushToContext, Arc::new(PushToContextHandler));
    registry.install(StageVariant::Select, Arc::new(SelectHandler));
    registry.install(
      StageVariant::NestedSequenceCall,
      Arc::new(NestedSequenceCallHandler),
    );
    registry.set_filter_factory(Arc::new(|pair| Arc::new(FilterHandler::new(pair))));
    registry
  }

  /// A registry with no handlers; resolution fails for every variant
  /// until handlers are installed.
  pub fn empty() -> Self {
    Self {
      fixed: HashMap::new(),
      filter_factory: None,
      filters: RwLock::new(HashMap::new()),
    }
  }

  /// Install (or replace) the handler for a simple variant.
  pub fn install(&mut self, variant: StageVariant, handler: Arc<dyn StageHandler>) {
    self.fixed.insert(variant, handler);
  }

  /// Install the factory that builds filter handlers per type pair.
  pub fn set_filter_factory(&mut self, factory: FilterFactory) {
    self.filter_factory = Some(factory);
  }

  /// Resolve the handler for a stage definition.
  pub fn resolve(&self, stage: &StageDefinition) -> Result<Arc<dyn StageHandler>, EngineError> {
    match &stage.kind {
      StageKind::Filter(filter) => {
        let pair = TypePair::new(stage.input_type.clone(), filter.item_type.clone());
        self.filter_for(pair)
      }
      kind => self
        .fixed
        .get(&kind.variant())
        .cloned()
        .ok_or_else(|| EngineError::StageExecutorNotFound {
          variant: kind.variant().to_string(),
        }),
    }
  }

  /// Get or build the filter handler for a concrete type pair.
  fn filter_for(&self, pair: TypePair) -> Result<Arc<dyn StageHandler>, EngineError> {
    let factory =
      self
        .filter_factory
        .as_ref()
        .ok_or_else(|| EngineError::StageExecutorNotFound {
          variant: StageVariant::Filter.to_string(),
        })?;

    // Read pass under the shared lock
    {
      let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
      if let Some(handler) = filters.get(&pair) {
        return Ok(handler.clone());
      }
    }

    // Miss: re-check under the exclusive lock before constructing
    let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
    if let Some(handler) = filters.get(&pair) {
      return Ok(handler.clone());
    }
    let handler = factory(pair.clone());
    filters.insert(pair, handler.clone());
    Ok(handler)
  }
}
