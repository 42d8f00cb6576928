use super::{index_metadata, Index, IndexCore, IndexKind, IndexOptions};
use crate::error::Result;
use crate::link::LinkStore;

/// At most one record per value. The link name is the value itself, so the
/// link store refusing to overwrite a name is what enforces uniqueness.
#[derive(Debug)]
pub struct UniqueIndex<S> {
    core: IndexCore<S>,
}

impl<S: LinkStore> UniqueIndex<S> {
    pub fn new(links: S, options: IndexOptions) -> Self {
        UniqueIndex {
            core: IndexCore::new(links, options, IndexKind::Unique),
        }
    }
}

impl<S: LinkStore> Index for UniqueIndex<S> {
    fn init(&self) -> Result<()> {
        self.core.init()
    }

    fn add(&self, id: &str, value: &str) -> Result<String> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let value = self.core.normalize(value);
        self.core.create_entry(id, &value, &value)
    }

    fn lookup(&self, value: &str) -> Result<Vec<String>> {
        self.core.lookup_entry(value)
    }

    fn remove(&self, _id: &str, value: &str) -> Result<()> {
        self.core.remove_entry(value)
    }

    fn search(&self, pattern: &str) -> Result<Vec<String>> {
        self.core.search_entries(pattern)
    }

    fn delete(&self) -> Result<()> {
        self.core.delete()
    }

    index_metadata!();
}
