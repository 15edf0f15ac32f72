//! Seams between the registry and the runtime graph.

use std::sync::Arc;

use async_trait::async_trait;
use sluice_pipeline::LogicalElement;
use thiserror::Error;

use crate::event::EventType;
use crate::stream::EventStream;

/// Failure reported by a [`PublisherSource`] while building a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PublisherError {
    message: String,
}

impl PublisherError {
    /// Create an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A runtime element able to publish reporting events.
#[async_trait]
pub trait PublisherSource: Send + Sync {
    /// Build the publisher for `event_type`.
    ///
    /// `Ok(None)` means the element does not produce this event type; the
    /// registry substitutes an empty stream.
    async fn publisher(&self, event_type: &EventType)
    -> Result<Option<EventStream>, PublisherError>;
}

/// Maps logical elements to the runtime elements that publish for them.
pub trait Resolver: Send + Sync {
    /// The publisher source for `element`, or `None` if it is not part of the
    /// materialized graph.
    fn resolve(&self, element: &LogicalElement) -> Option<Arc<dyn PublisherSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_error_displays_message() {
        let err = PublisherError::new("channel pool exhausted");
        assert_eq!(err.to_string(), "channel pool exhausted");
        assert_eq!(err.message(), "channel pool exhausted");
    }
}
