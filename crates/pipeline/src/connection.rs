//! Connection (hop) types linking pipeline operations.

use serde::{Deserialize, Serialize};
use sluice_core::{ConnectionId, OperationId};

use crate::element::LogicalElement;

/// A directed hop from one operation to another.
///
/// Endpoints are stored by id; the operations themselves live in the
/// pipeline's operation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection identifier within this pipeline.
    pub id: ConnectionId,
    /// Upstream operation.
    pub from: OperationId,
    /// Downstream operation.
    pub to: OperationId,
    /// Optional label shown by editors.
    #[serde(default)]
    pub label: Option<String>,
}

impl Connection {
    /// Create a connection with a fresh id.
    #[must_use]
    pub fn new(from: OperationId, to: OperationId) -> Self {
        Self::with_id(ConnectionId::v4(), from, to)
    }

    /// Create a connection with an explicit id.
    #[must_use]
    pub fn with_id(id: ConnectionId, from: OperationId, to: OperationId) -> Self {
        Self {
            id,
            from,
            to,
            label: None,
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns `true` if this connection forms a self-loop.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }

    /// The logical identity of this connection.
    #[must_use]
    pub fn element(&self) -> LogicalElement {
        LogicalElement::Connection(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_new() {
        let a = OperationId::v4();
        let b = OperationId::v4();
        let conn = Connection::new(a, b);
        assert_eq!(conn.from, a);
        assert_eq!(conn.to, b);
        assert!(conn.label.is_none());
        assert!(!conn.id.is_nil());
    }

    #[test]
    fn fresh_connections_get_distinct_ids() {
        let a = OperationId::v4();
        let b = OperationId::v4();
        assert_ne!(Connection::new(a, b).id, Connection::new(a, b).id);
    }

    #[test]
    fn connection_is_self_loop() {
        let a = OperationId::v4();
        let b = OperationId::v4();
        assert!(Connection::new(a, a).is_self_loop());
        assert!(!Connection::new(a, b).is_self_loop());
    }

    #[test]
    fn connection_serde_roundtrip() {
        let conn = Connection::new(OperationId::v4(), OperationId::v4()).with_label("main");
        let json = serde_json::to_string(&conn).unwrap();
        let back: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, conn.id);
        assert_eq!(back.from, conn.from);
        assert_eq!(back.to, conn.to);
        assert_eq!(back.label.as_deref(), Some("main"));
    }
}
