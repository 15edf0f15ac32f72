//! Reporting event types and built-in payloads.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sluice_pipeline::LogicalElement;

use crate::error::ReportingError;

/// Descriptor of a payload kind, e.g. `row_count`.
///
/// Two descriptors are equal when their names are equal, regardless of
/// whether they were built from a static or an owned string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    /// Build a descriptor from a static name.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build a descriptor from an owned name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The descriptor of a typed payload.
    #[must_use]
    pub fn of<P: EventPayload>() -> Self {
        Self::from_static(P::EVENT_TYPE)
    }

    /// The descriptor name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed payload carried by a [`ReportingEvent`].
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the [`EventType`] this payload travels under.
    const EVENT_TYPE: &'static str;
}

/// Row throughput of an operation or a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCount {
    /// Rows read from upstream.
    pub read: u64,
    /// Rows written downstream.
    pub written: u64,
    /// Rows rejected or routed to error handling.
    pub rejected: u64,
}

impl EventPayload for RowCount {
    const EVENT_TYPE: &'static str = "row_count";
}

/// Lifecycle state of a materialized element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Not started yet.
    Pending,
    /// Currently running.
    Running,
    /// Finished successfully.
    Finished,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Stopped,
}

impl OperationState {
    /// Whether no further transitions follow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }
}

/// A lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    /// The state entered.
    pub state: OperationState,
    /// Failure or stop reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationStatus {
    /// A transition without a message.
    #[must_use]
    pub fn new(state: OperationState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    /// A transition carrying a message.
    #[must_use]
    pub fn with_message(state: OperationState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: Some(message.into()),
        }
    }
}

impl EventPayload for OperationStatus {
    const EVENT_TYPE: &'static str = "operation_status";
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Errors.
    Error,
    /// Warnings.
    Warn,
    /// Informational messages.
    Info,
    /// Diagnostic detail.
    Debug,
}

/// A log line produced by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
}

impl EventPayload for LogEntry {
    const EVENT_TYPE: &'static str = "log_entry";
}

/// A single runtime observation attributed to a logical element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingEvent {
    /// The logical element the observation belongs to.
    pub source: LogicalElement,
    /// Kind of payload in `data`.
    pub event_type: EventType,
    /// The payload.
    pub data: serde_json::Value,
    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
}

impl ReportingEvent {
    /// Build an event from raw JSON data.
    #[must_use]
    pub fn new(source: LogicalElement, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            source,
            event_type,
            data,
            emitted_at: Utc::now(),
        }
    }

    /// Build an event from a typed payload.
    pub fn from_payload<P: EventPayload>(
        source: LogicalElement,
        payload: &P,
    ) -> Result<Self, ReportingError> {
        Ok(Self::new(
            source,
            EventType::of::<P>(),
            serde_json::to_value(payload)?,
        ))
    }

    /// Decode the payload as `P`.
    ///
    /// Fails with [`ReportingError::TypeMismatch`] when the event was not
    /// emitted under `P`'s event type.
    pub fn decode<P: EventPayload>(&self) -> Result<P, ReportingError> {
        let expected = EventType::of::<P>();
        if self.event_type != expected {
            return Err(ReportingError::TypeMismatch {
                expected,
                actual: self.event_type.clone(),
            });
        }
        Ok(P::deserialize(&self.data)?)
    }
}
