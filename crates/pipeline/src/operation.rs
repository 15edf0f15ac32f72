//! Operation (pipeline step) definition.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sluice_core::{OperationId, OperationKind};

use crate::element::LogicalElement;

/// A single step inside a pipeline graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    /// Unique operation identifier within this pipeline.
    pub id: OperationId,
    /// Human-readable label.
    pub name: String,
    /// Which runtime implementation this operation binds to.
    pub kind: OperationKind,
    /// Free-form settings handed to the runtime implementation.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// Optional description of what this operation does.
    #[serde(default)]
    pub description: Option<String>,
}

impl OperationDefinition {
    /// Create a minimal operation definition.
    #[must_use]
    pub fn new(id: OperationId, name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            config: HashMap::new(),
            description: None,
        }
    }

    /// Add a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Set a description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// The logical identity of this operation.
    #[must_use]
    pub fn element(&self) -> LogicalElement {
        LogicalElement::Operation(self.id)
    }
}
