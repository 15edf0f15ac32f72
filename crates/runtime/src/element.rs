//! The materialized element abstraction and its per-type channels.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sluice_pipeline::LogicalElement;
use sluice_reporting::{EventChannel, EventPayload, EventStream, EventType, PublisherSource};

/// Executable counterpart of exactly one logical element.
///
/// Every materialized element owns one [`EventChannel`] per event type it
/// publishes, created during materialization. As a [`PublisherSource`] it
/// hands out live streams over those channels and answers `None` for any
/// other type.
pub trait MaterializedElement: PublisherSource + fmt::Debug {
    /// The logical element this was materialized from.
    fn logical(&self) -> LogicalElement;

    /// The element's event channels.
    fn channels(&self) -> &ChannelSet;

    /// Close every channel, completing all open subscriptions.
    fn close(&self) {
        self.channels().close_all();
    }
}

/// The event channels of one materialized element, keyed by event type.
pub struct ChannelSet {
    source: LogicalElement,
    channels: HashMap<EventType, Arc<EventChannel>>,
}

impl ChannelSet {
    /// Create one open channel per distinct event type.
    #[must_use]
    pub fn new(
        source: LogicalElement,
        event_types: impl IntoIterator<Item = EventType>,
        capacity: usize,
    ) -> Self {
        let channels = event_types
            .into_iter()
            .map(|event_type| {
                let channel = Arc::new(EventChannel::new(source, event_type.clone(), capacity));
                (event_type, channel)
            })
            .collect();
        Self { source, channels }
    }

    /// The element the channels report for.
    #[must_use]
    pub fn source(&self) -> LogicalElement {
        self.source
    }

    /// The channel for `event_type`.
    #[must_use]
    pub fn get(&self, event_type: &EventType) -> Option<&Arc<EventChannel>> {
        self.channels.get(event_type)
    }

    /// The channel carrying payload `P`.
    #[must_use]
    pub fn typed<P: EventPayload>(&self) -> Option<&Arc<EventChannel>> {
        self.get(&EventType::of::<P>())
    }

    /// A live stream over the channel for `event_type`.
    #[must_use]
    pub fn stream(&self, event_type: &EventType) -> Option<EventStream> {
        self.get(event_type).cloned().map(EventStream::live)
    }

    /// Published event types, sorted by name.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.channels.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether there are no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Close every channel.
    pub fn close_all(&self) {
        for channel in self.channels.values() {
            channel.close();
        }
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSet")
            .field("source", &self.source)
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sluice_core::OperationId;
    use sluice_reporting::{LogEntry, OperationStatus, RowCount};

    fn set() -> ChannelSet {
        ChannelSet::new(
            LogicalElement::Operation(OperationId::v4()),
            [
                EventType::of::<RowCount>(),
                EventType::of::<OperationStatus>(),
                EventType::of::<RowCount>(),
            ],
            8,
        )
    }

    #[test]
    fn duplicate_types_share_one_channel() {
        let channels = set();
        assert_eq!(channels.len(), 2);
        assert_eq!(
            channels.event_types(),
            vec![
                EventType::of::<OperationStatus>(),
                EventType::of::<RowCount>()
            ]
        );
    }

    #[test]
    fn lookup_by_type() {
        let channels = set();
        assert!(channels.typed::<RowCount>().is_some());
        assert!(channels.typed::<LogEntry>().is_none());
        assert!(channels.stream(&EventType::of::<LogEntry>()).is_none());

        let a = channels.stream(&EventType::of::<RowCount>()).unwrap();
        let b = channels.stream(&EventType::of::<RowCount>()).unwrap();
        assert!(a.same_stream(&b));
    }

    #[test]
    fn close_all_closes_every_channel() {
        let channels = set();
        channels.close_all();
        assert!(channels.typed::<RowCount>().unwrap().is_closed());
        assert!(channels.typed::<OperationStatus>().unwrap().is_closed());
    }

    #[test]
    fn channels_report_for_their_element() {
        let channels = set();
        let source = channels.source();
        assert_eq!(channels.typed::<RowCount>().unwrap().source(), source);
    }
}
