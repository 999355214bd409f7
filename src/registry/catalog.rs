//! Load-by-name table of host classes

use super::class::{ClassSpec, HostClass};
use dashmap::DashMap;

type SpecFactory = fn() -> ClassSpec;

/// Host classes that can be registered by dotted name
///
/// Stands in for class loading: a name the catalog does not know is a
/// registration error, and the class stays absent from the registry.
#[derive(Default)]
pub struct ClassCatalog {
    entries: DashMap<String, SpecFactory>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `T` loadable under `name`
    pub fn add<T: HostClass>(&self, name: impl Into<String>) {
        self.entries.insert(name.into(), T::class_spec as SpecFactory);
    }

    /// Make a spec factory loadable under `name`
    pub fn add_factory(&self, name: impl Into<String>, factory: SpecFactory) {
        self.entries.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Describe the class registered under `name`
    pub fn load(&self, name: &str) -> Option<ClassSpec> {
        self.entries.get(name).map(|factory| (*factory)())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
