//! Logical-to-materialized element index.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use sluice_pipeline::LogicalElement;
use sluice_reporting::{PublisherSource, Resolver};

use crate::element::MaterializedElement;

/// Maps every logical element of a pipeline to its materialized counterpart.
///
/// Filled once by the [`Materializer`](crate::Materializer) and read-only
/// afterwards, so lookups take no lock.
#[derive(Default)]
pub struct ElementIndex {
    entries: HashMap<LogicalElement, Arc<dyn MaterializedElement>>,
}

impl ElementIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `element` under its logical identity.
    ///
    /// Returns `false`, leaving the index unchanged, if that identity is
    /// already mapped.
    pub fn insert(&mut self, element: Arc<dyn MaterializedElement>) -> bool {
        match self.entries.entry(element.logical()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(element);
                true
            }
        }
    }

    /// The materialized counterpart of `element`.
    #[must_use]
    pub fn get(&self, element: &LogicalElement) -> Option<&Arc<dyn MaterializedElement>> {
        self.entries.get(element)
    }

    /// Whether `element` is mapped.
    #[must_use]
    pub fn contains(&self, element: &LogicalElement) -> bool {
        self.entries.contains_key(element)
    }

    /// Number of mapped elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all mappings in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&LogicalElement, &Arc<dyn MaterializedElement>)> {
        self.entries.iter()
    }
}

impl Resolver for ElementIndex {
    fn resolve(&self, element: &LogicalElement) -> Option<Arc<dyn PublisherSource>> {
        self.entries
            .get(element)
            .map(|materialized| Arc::clone(materialized) as Arc<dyn PublisherSource>)
    }
}

impl fmt::Debug for ElementIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("ElementIndex").field("elements", &keys).finish()
    }
}
