#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sluice Pipeline
//!
//! The logical (declarative) side of a pipeline.
//!
//! A pipeline is an arena of operations addressed by [`OperationId`] and
//! connections stored as `(from, to)` id pairs, so there are no ownership
//! cycles between an operation and the hops that touch it. This crate provides:
//!
//! - [`PipelineDefinition`], [`OperationDefinition`] and [`Connection`]
//! - [`LogicalElement`], the stable identity of any node of the logical graph
//! - [`DependencyGraph`] (a `petgraph` wrapper) for ordering and level computation
//! - [`PipelineBuilder`] for fluent, validated construction
//! - [`validate_pipeline`] for multi-error validation
//!
//! [`OperationId`]: sluice_core::OperationId

pub mod builder;
pub mod connection;
pub mod definition;
pub mod element;
pub mod error;
pub mod graph;
pub mod operation;
pub mod validate;

pub use builder::PipelineBuilder;
pub use connection::Connection;
pub use definition::PipelineDefinition;
pub use element::{ElementKind, LogicalElement};
pub use error::PipelineError;
pub use graph::DependencyGraph;
pub use operation::OperationDefinition;
pub use validate::validate_pipeline;
