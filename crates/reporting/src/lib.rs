#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sluice Reporting
//!
//! Runtime observations flow from materialized elements to observers of the
//! logical pipeline through this crate.
//!
//! - [`EventType`] and [`EventPayload`] describe payload kinds; [`RowCount`],
//!   [`OperationStatus`] and [`LogEntry`] are the built-in ones
//! - [`EventChannel`] is a hot, multicast channel owned by one materialized element
//! - [`EventStream`] is the handle handed to observers, either live or the
//!   terminated empty sentinel
//! - [`PublisherRegistry`] memoizes one stream per `(element, event type)` pair
//!   and delegates construction to a [`PublisherSource`] found through a [`Resolver`]

pub mod error;
pub mod event;
pub mod registry;
pub mod source;
pub mod stream;

pub use error::ReportingError;
pub use event::{
    EventPayload, EventType, LogEntry, LogLevel, OperationState, OperationStatus, ReportingEvent,
    RowCount,
};
pub use registry::{PublisherKey, PublisherRegistry};
pub use source::{PublisherError, PublisherSource, Resolver};
pub use stream::{EventChannel, EventStream, EventSubscription};
