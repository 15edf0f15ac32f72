#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Sluice Execution
//!
//! The execution context: the facade a host builds around one execution
//! attempt of a logical pipeline.
//!
//! Creating an [`ExecutionContext`] materializes the pipeline once. From then
//! on observers ask the context for event streams of *logical* elements and
//! receive the streams their materialized counterparts publish into.
//! [`ExecutionContext::execute`] hands the context to an [`ExecutionEngine`].
//!
//! - [`ExecutionContext`] and [`ExecutionContextBuilder`] -- the facade
//! - [`ExecutionConfig`] and [`Scheduling`] -- per-execution settings
//! - [`ExecutionEngine`] and [`ExecutionHandle`] -- engine hand-off
//! - [`LocalEngine`] -- in-process engine running operations level by level
//! - [`ExecutionResult`], [`ExecutionStatus`] and [`OperationOutcome`]
//! - [`MetaStore`] and [`Repository`] -- opaque host collaborators

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod local;
pub mod result;
pub mod status;
pub mod store;

pub use config::{ExecutionConfig, Scheduling};
pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use engine::{ExecutionEngine, ExecutionHandle};
pub use error::{ConfigError, ContextError, ExecutionError};
pub use local::LocalEngine;
pub use result::{ExecutionResult, OperationOutcome};
pub use status::ExecutionStatus;
pub use store::{MetaStore, Repository};

/// Serde helper for `Option<Duration>` serialized as milliseconds.
pub(crate) mod serde_duration_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize an `Option<Duration>` as an optional integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => u64::try_from(d.as_millis())
                .unwrap_or(u64::MAX)
                .serialize(s),
            None => s.serialize_none(),
        }
    }

    /// Deserialize an optional integer of milliseconds into `Option<Duration>`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(d)?;
        Ok(opt.map(Duration::from_millis))
    }
}
