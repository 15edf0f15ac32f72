#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sluice Core
//!
//! Identifiers and keys shared by every Sluice crate.
//!
//! - **Identifiers**: [`PipelineId`], [`OperationId`], [`ConnectionId`], [`ExecutionId`]
//! - **Keys**: [`OperationKind`], the normalized name under which a runtime
//!   implementation for an operation is registered

pub mod id;
pub mod keys;

pub use id::*;
pub use keys::{OperationKind, OperationKindError};
