#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sluice Runtime
//!
//! The materialized (executable) side of a pipeline.
//!
//! This crate provides:
//! - [`OperationHandler`] -- the runtime implementation bound to an operation kind
//! - [`OperationRegistry`] -- registers and looks up handlers by [`OperationKind`]
//! - [`MaterializedPipeline`], [`MaterializedOperation`] and
//!   [`MaterializedConnection`] -- runtime nodes owning their event channels
//! - [`ElementIndex`] -- logical element to materialized element, the
//!   [`Resolver`](sluice_reporting::Resolver) behind the publisher registry
//! - [`Materializer`] -- the one-time compilation from logical to materialized graph
//!
//! [`OperationKind`]: sluice_core::OperationKind

pub mod element;
pub mod error;
pub mod handler;
pub mod index;
pub mod materialize;
pub mod materialized;
pub mod registry;

pub use element::{ChannelSet, MaterializedElement};
pub use error::{MaterializationError, OperationError};
pub use handler::{OperationContext, OperationHandler};
pub use index::ElementIndex;
pub use materialize::{Materialization, Materializer};
pub use materialized::{MaterializedConnection, MaterializedOperation, MaterializedPipeline};
pub use registry::OperationRegistry;
