//! Reporting error types.

use sluice_pipeline::LogicalElement;
use thiserror::Error;

use crate::event::EventType;

/// Errors surfaced by the reporting layer.
///
/// A missing publisher is not an error: the registry answers with
/// [`EventStream::Empty`](crate::EventStream::Empty) instead.
#[derive(Debug, Error)]
pub enum ReportingError {
    /// The materialized element failed while creating its publisher.
    #[error("failed to construct publisher for {element} ({event_type}): {reason}")]
    Construction {
        /// The logical element whose publisher was requested.
        element: LogicalElement,
        /// The requested event type.
        event_type: EventType,
        /// What the materialized element reported.
        reason: String,
    },

    /// A payload was decoded as, or published under, the wrong event type.
    #[error("event type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: EventType,
        /// The type actually carried.
        actual: EventType,
    },

    /// A payload could not be converted to or from JSON.
    #[error("payload codec: {0}")]
    Codec(#[from] serde_json::Error),
}
