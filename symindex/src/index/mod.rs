// Index kinds - unique, non-unique, autoincrement, written over LinkStore

mod autoincrement;
mod non_unique;
mod unique;

pub use autoincrement::AutoincrementIndex;
pub use non_unique::NonUniqueIndex;
pub use unique::UniqueIndex;

use crate::config::{RemoteConfig, ServiceUser};
use crate::error::{IndexerError, Result};
use crate::link::{base_name, join, LinkStore};
use serde::{Deserialize, Serialize};

/// The capability every index variant offers.
pub trait Index: Send + Sync {
    /// Create the root structures. Safe to call when they already exist.
    fn init(&self) -> Result<()>;

    /// Store `value -> id`. Returns the locator of the stored entry, or an
    /// empty string when there was nothing to store.
    fn add(&self, id: &str, value: &str) -> Result<String>;

    /// Exact-match read; `NotFound` if the value has no entry.
    fn lookup(&self, value: &str) -> Result<Vec<String>>;

    /// Delete `value -> id`; a no-op for an empty value.
    fn remove(&self, id: &str, value: &str) -> Result<()>;

    /// Move `id` from `old` to `new`. Not atomic: a failed add leaves the
    /// old entry removed.
    fn update(&self, id: &str, old: &str, new: &str) -> Result<()> {
        self.remove(id, old)?;
        self.add(id, new)?;
        Ok(())
    }

    /// Glob over the value space, returning matching primary keys.
    fn search(&self, pattern: &str) -> Result<Vec<String>>;

    fn kind(&self) -> IndexKind;
    fn index_by(&self) -> &str;
    fn type_name(&self) -> &str;
    fn files_dir(&self) -> &str;
    fn root_dir(&self) -> &str;
    fn case_insensitive(&self) -> bool;

    /// Destroy the index root and every entry under it.
    fn delete(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Unique,
    NonUnique,
    Autoincrement,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Unique => "unique",
            IndexKind::NonUnique => "non_unique",
            IndexKind::Autoincrement => "autoincrement",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "unique" => Ok(IndexKind::Unique),
            "non_unique" => Ok(IndexKind::NonUnique),
            "autoincrement" => Ok(IndexKind::Autoincrement),
            other => Err(IndexerError::UnknownIndexKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Range hint for autoincrement indices: `[lower, upper)`. An `upper` of 0
/// means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bound {
    pub lower: i64,
    #[serde(default)]
    pub upper: i64,
}

/// Construction options shared by all index kinds.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub type_name: String,
    pub index_by: String,
    /// Directory of the record files, relative to the store root
    pub files_dir: String,
    /// Local data directory (disk backend)
    pub data_dir: String,
    pub case_insensitive: bool,
    pub bound: Option<Bound>,
    pub remote: RemoteConfig,
    pub service_user: ServiceUser,
}

impl IndexOptions {
    pub fn new(type_name: impl Into<String>, index_by: impl Into<String>) -> Self {
        IndexOptions {
            type_name: type_name.into(),
            index_by: index_by.into(),
            ..Default::default()
        }
    }

    pub fn with_files_dir(mut self, files_dir: impl Into<String>) -> Self {
        self.files_dir = files_dir.into();
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_bound(mut self, bound: Option<Bound>) -> Self {
        self.bound = bound;
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig, service_user: ServiceUser) -> Self {
        self.remote = remote;
        self.service_user = service_user;
        self
    }
}

/// State and entry helpers shared by the index kinds.
#[derive(Debug)]
pub(crate) struct IndexCore<S> {
    links: S,
    options: IndexOptions,
    kind: IndexKind,
    root: String,
}

impl<S: LinkStore> IndexCore<S> {
    pub(crate) fn new(links: S, options: IndexOptions, kind: IndexKind) -> Self {
        let dir_name = format!("{}.{}.{}", kind, options.type_name, options.index_by);
        let root = join(&[links.index_dir(), dir_name.as_str()]);
        IndexCore {
            links,
            options,
            kind,
            root,
        }
    }

    pub(crate) fn links(&self) -> &S {
        &self.links
    }

    pub(crate) fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub(crate) fn kind(&self) -> IndexKind {
        self.kind
    }

    pub(crate) fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn normalize(&self, value: &str) -> String {
        if self.options.case_insensitive {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    /// Path of the record file an entry for `id` points at.
    pub(crate) fn target(&self, id: &str) -> String {
        join(&[self.options.files_dir.as_str(), id])
    }

    pub(crate) fn entry_path(&self, name: &str) -> String {
        join(&[self.root.as_str(), name])
    }

    pub(crate) fn not_found(&self, value: &str) -> IndexerError {
        IndexerError::NotFound {
            type_name: self.options.type_name.clone(),
            field: self.options.index_by.clone(),
            value: value.to_string(),
        }
    }

    pub(crate) fn already_exists(&self, value: &str) -> IndexerError {
        IndexerError::AlreadyExists {
            type_name: self.options.type_name.clone(),
            field: self.options.index_by.clone(),
            value: value.to_string(),
        }
    }

    pub(crate) fn init(&self) -> Result<()> {
        self.links.make_dir_all(&self.root)
    }

    pub(crate) fn delete(&self) -> Result<()> {
        log::debug!("deleting index {}", self.root);
        self.links.remove_all(&self.root)
    }

    /// Create `<root>/<name>` pointing at the record of `id`. `name` may nest
    /// below a bucket; `value` is what the caller indexed.
    pub(crate) fn create_entry(&self, id: &str, name: &str, value: &str) -> Result<String> {
        check_segment(id)?;
        check_segment(value)?;
        let link = self.entry_path(name);
        match self.links.create_link(&self.target(id), &link) {
            Ok(()) => {
                log::debug!("{} {}: {} -> {}", self.kind, self.root, name, id);
                Ok(link)
            }
            Err(e) if e.is_already_exists() => Err(self.already_exists(value)),
            Err(e) => Err(e),
        }
    }

    /// Resolve a single-link entry to its primary key.
    pub(crate) fn lookup_entry(&self, value: &str) -> Result<Vec<String>> {
        let value = self.normalize(value);
        if check_segment(&value).is_err() {
            return Err(self.not_found(&value));
        }
        match self.links.resolve_link(&self.entry_path(&value)) {
            Ok(target) => Ok(vec![base_name(&target).to_string()]),
            Err(e) if e.is_not_found() => Err(self.not_found(&value)),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn remove_entry(&self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let value = self.normalize(value);
        if check_segment(&value).is_err() {
            return Err(self.not_found(&value));
        }
        match self.links.remove(&self.entry_path(&value)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(self.not_found(&value)),
            Err(e) => Err(e),
        }
    }

    /// Names directly under the root that match a glob pattern.
    pub(crate) fn matching_names(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = self.normalize(pattern);
        let matcher = glob::Pattern::new(&pattern)
            .map_err(|e| IndexerError::Filter(format!("invalid search pattern '{pattern}': {e}")))?;
        let names = match self.links.read_dir(&self.root) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Err(self.not_found(&pattern)),
            Err(e) => return Err(e),
        };
        Ok(names.into_iter().filter(|n| matcher.matches(n)).collect())
    }

    /// Search over single-link entries, resolving each match to its key.
    pub(crate) fn search_entries(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for name in self.matching_names(pattern)? {
            let target = self.links.resolve_link(&self.entry_path(&name))?;
            keys.push(base_name(&target).to_string());
        }
        if keys.is_empty() {
            return Err(self.not_found(pattern));
        }
        Ok(keys)
    }
}

/// Values and keys become path segments; reject the ones that cannot.
pub(crate) fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0')
    {
        return Err(IndexerError::InvalidValue {
            value: segment.to_string(),
        });
    }
    Ok(())
}

/// Generates the metadata accessors of `Index` for a type with a `core` field.
macro_rules! index_metadata {
    () => {
        fn kind(&self) -> $crate::index::IndexKind {
            self.core.kind()
        }

        fn index_by(&self) -> &str {
            &self.core.options().index_by
        }

        fn type_name(&self) -> &str {
            &self.core.options().type_name
        }

        fn files_dir(&self) -> &str {
            &self.core.options().files_dir
        }

        fn root_dir(&self) -> &str {
            self.core.root()
        }

        fn case_insensitive(&self) -> bool {
            self.core.options().case_insensitive
        }
    };
}
pub(crate) use index_metadata;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(IndexKind::parse("non_unique").unwrap(), IndexKind::NonUnique);
        assert_eq!(IndexKind::Autoincrement.to_string(), "autoincrement");
        assert!(matches!(
            IndexKind::parse("fulltext"),
            Err(IndexerError::UnknownIndexKind(_))
        ));
    }

    #[test]
    fn test_check_segment() {
        assert!(check_segment("a@example.com").is_ok());
        assert!(check_segment("Mikey").is_ok());
        assert!(check_segment("a/b").is_err());
        assert!(check_segment("..").is_err());
        assert!(check_segment("").is_err());
    }

    #[test]
    fn test_options_builder() {
        let opts = IndexOptions::new("accounts.Account", "UidNumber")
            .with_files_dir("accounts")
            .with_data_dir("/tmp/data")
            .with_case_insensitive(true)
            .with_bound(Some(Bound {
                lower: 10,
                upper: 20,
            }));
        assert_eq!(opts.files_dir, "accounts");
        assert!(opts.case_insensitive);
        assert_eq!(opts.bound.unwrap().lower, 10);
    }
}
