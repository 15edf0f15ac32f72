//! Hot, multicast event streams.
//!
//! Uses [`tokio::sync::broadcast`] for fan-out delivery to multiple subscribers.
//! Every subscriber owns an independent receiver, so dropping one subscription
//! never affects the others. Events are not replayed: a subscriber sees what
//! is published after it subscribed.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use parking_lot::RwLock;
use sluice_pipeline::LogicalElement;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::error::ReportingError;
use crate::event::{EventPayload, EventType, ReportingEvent};

/// The publishing side of one `(element, event type)` stream.
///
/// Owned by a materialized element. Publishing without subscribers is not an
/// error; the event is dropped. [`close`](Self::close) ends every open
/// subscription once its buffered events are drained.
pub struct EventChannel {
    source: LogicalElement,
    event_type: EventType,
    sender: RwLock<Option<broadcast::Sender<Arc<ReportingEvent>>>>,
    emitted: AtomicU64,
}

impl EventChannel {
    /// Create an open channel buffering up to `capacity` events per subscriber.
    ///
    /// Slow subscribers that fall further behind skip the oldest events.
    #[must_use]
    pub fn new(source: LogicalElement, event_type: EventType, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            source,
            event_type,
            sender: RwLock::new(Some(sender)),
            emitted: AtomicU64::new(0),
        }
    }

    /// The element this channel reports for.
    #[must_use]
    pub fn source(&self) -> LogicalElement {
        self.source
    }

    /// The event type carried.
    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Publish raw JSON data. Returns the number of subscribers reached.
    pub fn publish(&self, data: serde_json::Value) -> usize {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            tracing::trace!(source = %self.source, event_type = %self.event_type, "publish on closed channel ignored");
            return 0;
        };
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let event = ReportingEvent::new(self.source, self.event_type.clone(), data);
        // No receivers is fine: events are fire-and-forget.
        sender.send(Arc::new(event)).unwrap_or(0)
    }

    /// Publish a typed payload.
    ///
    /// Fails with [`ReportingError::TypeMismatch`] if `P` does not travel under
    /// this channel's event type.
    pub fn publish_payload<P: EventPayload>(&self, payload: &P) -> Result<usize, ReportingError> {
        let actual = EventType::of::<P>();
        if actual != self.event_type {
            return Err(ReportingError::TypeMismatch {
                expected: self.event_type.clone(),
                actual,
            });
        }
        Ok(self.publish(serde_json::to_value(payload)?))
    }

    /// Open a new subscription.
    ///
    /// Subscribing to a closed channel yields a subscription that is already complete.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        match self.sender.read().as_ref() {
            Some(sender) => EventSubscription::from_receiver(sender.subscribe()),
            None => EventSubscription::completed(),
        }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            tracing::trace!(source = %self.source, event_type = %self.event_type, "event channel closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Total events published since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("source", &self.source)
            .field("event_type", &self.event_type)
            .field("closed", &self.is_closed())
            .field("emitted", &self.total_emitted())
            .finish()
    }
}

/// Handle to a stream of reporting events, as cached by the registry.
///
/// Cloning is cheap and every clone refers to the same underlying stream.
#[derive(Debug, Clone)]
pub enum EventStream {
    /// Backed by a materialized element's channel.
    Live(Arc<EventChannel>),
    /// Terminated sentinel: every subscription completes without emitting.
    Empty,
}

impl EventStream {
    /// The terminated sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// A stream backed by `channel`.
    #[must_use]
    pub fn live(channel: Arc<EventChannel>) -> Self {
        Self::Live(channel)
    }

    /// Whether this is the empty sentinel.
    #[must_use]
    pub fn is_empty_stream(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The backing channel of a live stream.
    #[must_use]
    pub fn channel(&self) -> Option<&Arc<EventChannel>> {
        match self {
            Self::Live(channel) => Some(channel),
            Self::Empty => None,
        }
    }

    /// Whether both handles refer to the same underlying stream.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Live(a), Self::Live(b)) => Arc::ptr_eq(a, b),
            (Self::Empty, Self::Empty) => true,
            _ => false,
        }
    }

    /// Open a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        match self {
            Self::Live(channel) => channel.subscribe(),
            Self::Empty => EventSubscription::completed(),
        }
    }
}

/// One consumer's view of an [`EventStream`].
///
/// Implements [`Stream`]; the stream ends when the channel is closed.
/// Dropping the subscription unsubscribes.
pub struct EventSubscription {
    inner: Option<BroadcastStream<Arc<ReportingEvent>>>,
}

impl EventSubscription {
    fn from_receiver(receiver: broadcast::Receiver<Arc<ReportingEvent>>) -> Self {
        Self {
            inner: Some(BroadcastStream::new(receiver)),
        }
    }

    fn completed() -> Self {
        Self { inner: None }
    }

    /// Wait for the next event. Returns `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Arc<ReportingEvent>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Whether the stream is known to have ended.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for EventSubscription {
    type Item = Arc<ReportingEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match Pin::new(inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "reporting subscriber lagged, events dropped");
                }
                Poll::Ready(None) => {
                    self.inner = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogEntry, LogLevel, RowCount};
    use sluice_core::OperationId;
    use tokio_stream::StreamExt;

    fn channel(capacity: usize) -> Arc<EventChannel> {
        Arc::new(EventChannel::new(
            LogicalElement::Operation(OperationId::v4()),
            EventType::of::<RowCount>(),
            capacity,
        ))
    }

    fn rows(written: u64) -> RowCount {
        RowCount {
            read: written,
            written,
            rejected: 0,
        }
    }

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let ch = channel(8);
        assert_eq!(ch.publish_payload(&rows(1)).unwrap(), 0);
        assert_eq!(ch.total_emitted(), 1);
    }

    #[test]
    fn publish_payload_rejects_foreign_type() {
        let ch = channel(8);
        let err = ch
            .publish_payload(&LogEntry {
                level: LogLevel::Info,
                message: "x".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ReportingError::TypeMismatch { .. }));
        assert_eq!(ch.total_emitted(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let ch = channel(8);
        let stream = EventStream::live(ch.clone());
        let mut first = stream.subscribe();
        let mut second = stream.subscribe();

        assert_eq!(ch.publish_payload(&rows(3)).unwrap(), 2);

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.decode::<RowCount>().unwrap(), rows(3));
        assert_eq!(b.source, ch.source());
    }

    #[tokio::test]
    async fn dropping_one_subscriber_leaves_others_running() {
        let ch = channel(8);
        let first = ch.subscribe();
        let mut second = ch.subscribe();
        assert_eq!(ch.subscriber_count(), 2);

        drop(first);
        assert_eq!(ch.subscriber_count(), 1);

        ch.publish_payload(&rows(5)).unwrap();
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let ch = channel(8);
        let sub = ch.subscribe();
        ch.publish_payload(&rows(1)).unwrap();
        ch.publish_payload(&rows(2)).unwrap();
        ch.close();
        ch.close();

        let events: Vec<_> = sub.collect().await;
        assert_eq!(events.len(), 2);
        assert!(ch.is_closed());
        assert_eq!(ch.publish_payload(&rows(3)).unwrap(), 0);
    }

    #[tokio::test]
    async fn subscribing_after_close_completes_immediately() {
        let ch = channel(8);
        ch.close();
        let mut sub = ch.subscribe();
        assert!(sub.is_terminated());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_completes_without_events() {
        let stream = EventStream::empty();
        assert!(stream.is_empty_stream());
        assert!(stream.channel().is_none());
        let events: Vec<_> = stream.subscribe().collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_oldest_events() {
        let ch = channel(2);
        let sub = ch.subscribe();
        for n in 0..5 {
            ch.publish_payload(&rows(n)).unwrap();
        }
        ch.close();

        let written: Vec<u64> = sub
            .map(|e| e.decode::<RowCount>().unwrap().written)
            .collect()
            .await;
        assert_eq!(written, vec![3, 4]);
    }

    #[test]
    fn same_stream_compares_identity() {
        let ch = channel(4);
        let a = EventStream::live(ch.clone());
        let b = a.clone();
        let c = EventStream::live(channel(4));

        assert!(a.same_stream(&b));
        assert!(!a.same_stream(&c));
        assert!(EventStream::empty().same_stream(&EventStream::Empty));
        assert!(!a.same_stream(&EventStream::Empty));
    }
}
