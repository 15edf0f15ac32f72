//! Memoizing registry of event streams keyed by `(element, event type)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use sluice_pipeline::LogicalElement;
use tokio::sync::OnceCell;

use crate::error::ReportingError;
use crate::event::{EventPayload, EventType};
use crate::source::Resolver;
use crate::stream::EventStream;

/// Cache key: a logical element paired with an event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublisherKey {
    /// The logical element observed.
    pub source: LogicalElement,
    /// The event type requested.
    pub event_type: EventType,
}

impl PublisherKey {
    /// Create a key.
    #[must_use]
    pub fn new(source: LogicalElement, event_type: EventType) -> Self {
        Self { source, event_type }
    }
}

/// Hands out one stream per `(element, event type)` pair.
///
/// The first request for a key resolves the element through the [`Resolver`]
/// and asks the materialized element for its publisher. Later requests, and
/// concurrent requests racing the first one, receive the same stream. Elements
/// the resolver does not know, and elements that do not publish the requested
/// type, get [`EventStream::Empty`].
///
/// A failed construction is returned to the caller that triggered it and is
/// not cached; the next request for that key tries again.
pub struct PublisherRegistry {
    resolver: Arc<dyn Resolver>,
    cache: DashMap<PublisherKey, Arc<OnceCell<EventStream>>>,
    constructions: AtomicUsize,
}

impl PublisherRegistry {
    /// Create an empty registry backed by `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            cache: DashMap::new(),
            constructions: AtomicUsize::new(0),
        }
    }

    /// The stream of `event_type` events for `source`.
    pub async fn event_stream(
        &self,
        source: LogicalElement,
        event_type: &EventType,
    ) -> Result<EventStream, ReportingError> {
        let key = PublisherKey::new(source, event_type.clone());
        // The shard guard is released before awaiting.
        let cell = self.cache.entry(key.clone()).or_default().clone();
        cell.get_or_try_init(|| self.construct(&key))
            .await
            .cloned()
    }

    /// The stream of events carrying payload `P` for `source`.
    pub async fn typed_stream<P: EventPayload>(
        &self,
        source: LogicalElement,
    ) -> Result<EventStream, ReportingError> {
        self.event_stream(source, &EventType::of::<P>()).await
    }

    async fn construct(&self, key: &PublisherKey) -> Result<EventStream, ReportingError> {
        self.constructions.fetch_add(1, Ordering::Relaxed);

        let Some(publisher) = self.resolver.resolve(&key.source) else {
            tracing::debug!(
                source = %key.source,
                event_type = %key.event_type,
                "element not materialized, caching empty stream"
            );
            return Ok(EventStream::Empty);
        };

        match publisher.publisher(&key.event_type).await {
            Ok(Some(stream)) => {
                tracing::debug!(source = %key.source, event_type = %key.event_type, "cached live stream");
                Ok(stream)
            }
            Ok(None) => {
                tracing::debug!(
                    source = %key.source,
                    event_type = %key.event_type,
                    "element does not publish event type, caching empty stream"
                );
                Ok(EventStream::Empty)
            }
            Err(err) => {
                tracing::warn!(
                    source = %key.source,
                    event_type = %key.event_type,
                    error = %err,
                    "publisher construction failed"
                );
                Err(ReportingError::Construction {
                    element: key.source,
                    event_type: key.event_type.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Number of keys holding a constructed stream.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Whether a constructed stream is cached for `key`.
    #[must_use]
    pub fn contains(&self, key: &PublisherKey) -> bool {
        self.cache
            .get(key)
            .is_some_and(|entry| entry.value().initialized())
    }

    /// How many times construction has been attempted, across all keys.
    #[must_use]
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PublisherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherRegistry")
            .field("cached", &self.cached_len())
            .field("constructions", &self.construction_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use sluice_core::{ConnectionId, OperationId, PipelineId};

    use super::*;
    use crate::event::{LogEntry, OperationStatus, RowCount};
    use crate::source::{PublisherError, PublisherSource};
    use crate::stream::EventChannel;

    /// Publishes `RowCount` only, after a short delay so concurrent callers overlap.
    struct SlowRows {
        channel: Arc<EventChannel>,
    }

    #[async_trait]
    impl PublisherSource for SlowRows {
        async fn publisher(
            &self,
            event_type: &EventType,
        ) -> Result<Option<EventStream>, PublisherError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if *event_type == EventType::of::<RowCount>() {
                Ok(Some(EventStream::live(self.channel.clone())))
            } else {
                Ok(None)
            }
        }
    }

    /// Fails until `healthy` is set.
    struct Flaky {
        healthy: AtomicBool,
        channel: Arc<EventChannel>,
    }

    #[async_trait]
    impl PublisherSource for Flaky {
        async fn publisher(
            &self,
            _event_type: &EventType,
        ) -> Result<Option<EventStream>, PublisherError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(Some(EventStream::live(self.channel.clone())))
            } else {
                Err(PublisherError::new("not ready"))
            }
        }
    }

    #[derive(Default)]
    struct MapResolver(HashMap<LogicalElement, Arc<dyn PublisherSource>>);

    impl Resolver for MapResolver {
        fn resolve(&self, element: &LogicalElement) -> Option<Arc<dyn PublisherSource>> {
            self.0.get(element).cloned()
        }
    }

    fn slow_registry() -> (Arc<PublisherRegistry>, LogicalElement) {
        let element = LogicalElement::Operation(OperationId::v4());
        let channel = Arc::new(EventChannel::new(element, EventType::of::<RowCount>(), 16));
        let mut map = MapResolver::default();
        map.0.insert(element, Arc::new(SlowRows { channel }));
        (Arc::new(PublisherRegistry::new(Arc::new(map))), element)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_constructs_once() {
        let (registry, element) = slow_registry();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.typed_stream::<RowCount>(element).await.unwrap()
            }));
        }

        let mut streams = Vec::new();
        for task in tasks {
            streams.push(task.await.unwrap());
        }

        assert_eq!(registry.construction_count(), 1);
        assert!(streams.iter().all(|s| s.same_stream(&streams[0])));
        assert!(!streams[0].is_empty_stream());
    }

    #[tokio::test]
    async fn repeated_calls_return_cached_stream() {
        let (registry, element) = slow_registry();
        let first = registry.typed_stream::<RowCount>(element).await.unwrap();
        let second = registry.typed_stream::<RowCount>(element).await.unwrap();

        assert!(first.same_stream(&second));
        assert_eq!(registry.construction_count(), 1);
        assert_eq!(registry.cached_len(), 1);
        assert!(registry.contains(&PublisherKey::new(element, EventType::of::<RowCount>())));
    }

    #[rstest]
    #[case::pipeline(LogicalElement::Pipeline(PipelineId::v4()))]
    #[case::operation(LogicalElement::Operation(OperationId::v4()))]
    #[case::connection(LogicalElement::Connection(ConnectionId::v4()))]
    #[tokio::test]
    async fn unknown_element_yields_cached_empty_stream(#[case] element: LogicalElement) {
        let registry = PublisherRegistry::new(Arc::new(MapResolver::default()));

        let stream = registry.typed_stream::<LogEntry>(element).await.unwrap();
        assert!(stream.is_empty_stream());

        let again = registry.typed_stream::<LogEntry>(element).await.unwrap();
        assert!(again.is_empty_stream());
        assert_eq!(registry.construction_count(), 1);
        assert_eq!(registry.cached_len(), 1);
    }

    #[tokio::test]
    async fn unpublished_event_type_yields_empty_stream() {
        let (registry, element) = slow_registry();
        let stream = registry
            .typed_stream::<OperationStatus>(element)
            .await
            .unwrap();
        assert!(stream.is_empty_stream());
    }

    #[tokio::test]
    async fn distinct_event_types_are_distinct_keys() {
        let (registry, element) = slow_registry();
        let rows = registry.typed_stream::<RowCount>(element).await.unwrap();
        let status = registry
            .typed_stream::<OperationStatus>(element)
            .await
            .unwrap();

        assert!(!rows.same_stream(&status));
        assert_eq!(registry.construction_count(), 2);
        assert_eq!(registry.cached_len(), 2);
    }

    #[test]
    fn key_equality_needs_both_components() {
        let op = LogicalElement::Operation(OperationId::v4());
        let other = LogicalElement::Operation(OperationId::v4());

        assert_eq!(
            PublisherKey::new(op, EventType::new("row_count")),
            PublisherKey::new(op, EventType::of::<RowCount>())
        );
        assert_ne!(
            PublisherKey::new(op, EventType::of::<RowCount>()),
            PublisherKey::new(other, EventType::of::<RowCount>())
        );
        assert_ne!(
            PublisherKey::new(op, EventType::of::<RowCount>()),
            PublisherKey::new(op, EventType::of::<LogEntry>())
        );
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let element = LogicalElement::Operation(OperationId::v4());
        let flaky = Arc::new(Flaky {
            healthy: AtomicBool::new(false),
            channel: Arc::new(EventChannel::new(element, EventType::of::<RowCount>(), 4)),
        });
        let mut map = MapResolver::default();
        map.0.insert(element, flaky.clone());
        let registry = PublisherRegistry::new(Arc::new(map));

        let err = registry.typed_stream::<RowCount>(element).await.unwrap_err();
        match err {
            ReportingError::Construction {
                element: failed,
                reason,
                ..
            } => {
                assert_eq!(failed, element);
                assert_eq!(reason, "not ready");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.cached_len(), 0);

        flaky.healthy.store(true, Ordering::SeqCst);
        let stream = registry.typed_stream::<RowCount>(element).await.unwrap();
        assert!(!stream.is_empty_stream());
        assert_eq!(registry.construction_count(), 2);
        assert_eq!(registry.cached_len(), 1);
    }
}
