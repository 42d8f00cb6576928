// Index constructor registry keyed by (backend, kind)

use crate::error::{IndexerError, Result};
use crate::index::{Index, IndexKind, IndexOptions};
use crate::link::{disk, remote};
use std::collections::HashMap;
use std::sync::Arc;

pub type IndexConstructor = fn(&IndexOptions) -> Result<Arc<dyn Index>>;

#[derive(Clone)]
pub struct IndexRegistry {
    constructors: HashMap<(String, IndexKind), IndexConstructor>,
}

impl IndexRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        IndexRegistry {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every kind registered for the disk and cs3 backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        disk::register(&mut registry);
        remote::register(&mut registry);
        registry
    }

    pub fn register(&mut self, backend: &str, kind: IndexKind, ctor: IndexConstructor) {
        self.constructors.insert((backend.to_string(), kind), ctor);
    }

    pub fn get(&self, backend: &str, kind: IndexKind) -> Result<IndexConstructor> {
        self.constructors
            .get(&(backend.to_string(), kind))
            .copied()
            .ok_or_else(|| {
                if self.constructors.keys().any(|(b, _)| b == backend) {
                    IndexerError::UnknownIndexKind(format!("{kind} for backend {backend}"))
                } else {
                    IndexerError::UnknownBackend(backend.to_string())
                }
            })
    }

    /// Construct an index through the registered constructor.
    pub fn build(
        &self,
        backend: &str,
        kind: IndexKind,
        options: &IndexOptions,
    ) -> Result<Arc<dyn Index>> {
        let ctor = self.get(backend, kind)?;
        ctor(options)
    }
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .constructors
            .keys()
            .map(|(backend, kind)| format!("{backend}/{kind}"))
            .collect();
        keys.sort();
        f.debug_struct("IndexRegistry")
            .field("constructors", &keys)
            .finish()
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
