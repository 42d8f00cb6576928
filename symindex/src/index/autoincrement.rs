use super::{index_metadata, Index, IndexCore, IndexKind, IndexOptions};
use crate::error::{IndexerError, Result};
use crate::link::LinkStore;

/// A unique index that assigns the next free integer when the record
/// carries no value. Assigned numbers stay within the configured bound.
#[derive(Debug)]
pub struct AutoincrementIndex<S> {
    core: IndexCore<S>,
}

impl<S: LinkStore> AutoincrementIndex<S> {
    pub fn new(links: S, options: IndexOptions) -> Self {
        AutoincrementIndex {
            core: IndexCore::new(links, options, IndexKind::Autoincrement),
        }
    }

    /// One past the largest numeric entry, but never below the lower bound.
    /// Entries that are not integers are ignored.
    pub fn next(&self) -> Result<i64> {
        let names = match self.core.links().read_dir(self.core.root()) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let bound = self.core.options().bound.unwrap_or_default();

        let exhausted = || IndexerError::SequenceExhausted {
            type_name: self.core.options().type_name.clone(),
            field: self.core.options().index_by.clone(),
            upper: bound.upper,
        };
        let next = match names.iter().filter_map(|n| n.parse::<i64>().ok()).max() {
            Some(latest) if latest >= bound.lower => {
                latest.checked_add(1).ok_or_else(exhausted)?
            }
            _ => bound.lower,
        };
        if bound.upper > 0 && next >= bound.upper {
            return Err(exhausted());
        }
        Ok(next)
    }
}

impl<S: LinkStore> Index for AutoincrementIndex<S> {
    fn init(&self) -> Result<()> {
        self.core.init()
    }

    fn add(&self, id: &str, value: &str) -> Result<String> {
        let value = if value.is_empty() {
            self.next()?.to_string()
        } else {
            self.core.normalize(value)
        };
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
