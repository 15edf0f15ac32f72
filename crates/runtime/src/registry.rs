//! Operation registry for looking up handlers by kind.

use std::sync::Arc;

use dashmap::DashMap;
use sluice_core::OperationKind;

use crate::handler::OperationHandler;

/// Thread-safe registry of operation handlers.
///
/// Handlers are registered by [`OperationKind`] (e.g. `table_input`) and
/// looked up when a pipeline is materialized. Uses `DashMap` for lock-free
/// concurrent access.
pub struct OperationRegistry {
    handlers: DashMap<OperationKind, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register an operation handler.
    ///
    /// If a handler for the same kind already exists, it is replaced.
    pub fn register(&self, handler: Arc<dyn OperationHandler>) {
        let kind = handler.kind().clone();
        tracing::info!(operation_kind = %kind, "registered operation handler");
        self.handlers.insert(kind, handler);
    }

    /// Look up the handler for `kind`.
    #[must_use]
    pub fn get(&self, kind: &OperationKind) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(kind).map(|entry| entry.value().clone())
    }

    /// Check if a handler is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &OperationKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Remove a handler. Returns the removed handler, if any.
    pub fn remove(&self, kind: &OperationKind) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.remove(kind).map(|(_, v)| v)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// List all registered kinds.
    #[must_use]
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
