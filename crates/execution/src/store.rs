//! Opaque host collaborators carried by the context.
//!
//! The context never calls into them beyond identification; operations and
//! hosts downcast or wrap them as they see fit.

use std::fmt;

/// Handle to the host's metadata store.
pub trait MetaStore: fmt::Debug + Send + Sync {
    /// Name of the store, for logs.
    fn name(&self) -> &str;
}

/// Handle to the repository pipeline definitions were loaded from.
pub trait Repository: fmt::Debug + Send + Sync {
    /// Name of the repository, for logs.
    fn name(&self) -> &str;
}
