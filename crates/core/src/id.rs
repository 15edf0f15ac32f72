//! Unique identifiers for pipeline elements and executions.
//!
//! Each identifier is a [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrapper parameterized by its own domain marker, so a
//! `ConnectionId` can never be passed where an `OperationId` is expected.
//!
//! All ID types are `Copy` (16 bytes) and support `v4()`, `nil()`,
//! `parse(&str)`, serde (as a UUID string), `Display`, `Eq`, `Ord` and `Hash`.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(PipelineIdDomain => PipelineId);
define_uuid!(OperationIdDomain => OperationId);
define_uuid!(ConnectionIdDomain => ConnectionId);
define_uuid!(ExecutionIdDomain => ExecutionId);
