// Indexer facade - index registration, record fan-out, per-type locking

pub mod locks;
mod saga;

use crate::config::{BackendKind, Config, IndexDeclaration};
use crate::error::{IndexerError, Result};
use crate::index::{Index, IndexKind, IndexOptions};
use crate::link::{base_name, join};
use crate::query;
use crate::record::{normalize_field, require_field, Record};
use crate::registry::IndexRegistry;
use locks::TypeLocks;
use parking_lot::RwLock;
use saga::Saga;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Directory remote record files live under, relative to the provider root.
const REMOTE_META_DIR: &str = "meta";

/// A value produced while indexing a record, keyed by the field it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddResult {
    pub field: String,
    /// Locator of the stored entry
    pub value: String,
}

impl AddResult {
    /// The stored value itself, e.g. the number an autoincrement index assigned.
    pub fn assigned(&self) -> &str {
        base_name(&self.value)
    }
}

/// A `(field, value)` pair for [`Indexer::find_by_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Default)]
struct TypeIndices {
    primary_key: String,
    by_field: BTreeMap<String, Vec<Arc<dyn Index>>>,
}

impl TypeIndices {
    /// Every index with the field it indexes, in field order.
    fn all(&self) -> Vec<(String, Arc<dyn Index>)> {
        self.by_field
            .iter()
            .flat_map(|(field, indices)| indices.iter().map(|i| (field.clone(), i.clone())))
            .collect()
    }
}

pub struct Indexer {
    config: Config,
    registry: IndexRegistry,
    indices: RwLock<HashMap<String, TypeIndices>>,
    locks: TypeLocks,
}

impl Indexer {
    /// An indexer with the default constructor registry and no indices.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, IndexRegistry::with_defaults())
    }

    pub fn with_registry(config: Config, registry: IndexRegistry) -> Self {
        Indexer {
            config,
            registry,
            indices: RwLock::new(HashMap::new()),
            locks: TypeLocks::new(),
        }
    }

    /// An indexer with every index declared in `config.indices` registered.
    pub fn from_config(config: Config) -> Result<Self> {
        let declarations = config.indices.clone();
        let indexer = Self::new(config);
        for decl in &declarations {
            indexer.add_index(decl)?;
        }
        Ok(indexer)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn options_for(&self, decl: &IndexDeclaration) -> IndexOptions {
        let options = IndexOptions::new(&decl.type_name, normalize_field(&decl.field))
            .with_case_insensitive(decl.case_insensitive)
            .with_bound(decl.bound);
        let repo = &self.config.repo;
        match repo.backend {
            BackendKind::Disk => options
                .with_files_dir(&decl.entity_dir)
                .with_data_dir(&repo.disk.path),
            BackendKind::Cs3 => options
                .with_files_dir(join(&[REMOTE_META_DIR, decl.entity_dir.as_str()]))
                .with_remote(repo.cs3.clone(), self.config.service_user.clone()),
        }
    }

    /// Register an index and create its root. Registering the same
    /// (type, field, kind) again replaces the previous index.
    pub fn add_index(&self, decl: &IndexDeclaration) -> Result<()> {
        let lock = self.locks.get(&decl.type_name);
        let _guard = lock.write();

        let options = self.options_for(decl);
        let backend = self.config.repo.backend.as_str();
        let index = self.registry.build(backend, decl.kind, &options)?;
        index.init()?;

        let field = options.index_by.clone();
        let primary_key = normalize_field(&decl.primary_key);
        let mut map = self.indices.write();
        let entry = map.entry(decl.type_name.clone()).or_default();
        if !entry.primary_key.is_empty() && entry.primary_key != primary_key {
            log::warn!(
                "{}: primary key changed from {} to {}",
                decl.type_name,
                entry.primary_key,
                primary_key
            );
        }
        entry.primary_key = primary_key;

        let indices = entry.by_field.entry(field).or_default();
        match indices.iter_mut().find(|i| i.kind() == decl.kind) {
            Some(existing) => {
                log::info!("replacing index {}", index.root_dir());
                *existing = index;
            }
            None => {
                log::info!("registered index {} ({backend})", index.root_dir());
                indices.push(index);
            }
        }
        Ok(())
    }

    fn snapshot(&self, type_name: &str) -> Option<(String, Vec<(String, Arc<dyn Index>)>)> {
        let map = self.indices.read();
        map.get(type_name)
            .map(|entry| (entry.primary_key.clone(), entry.all()))
    }

    fn field_indices(&self, type_name: &str, field: &str) -> Vec<Arc<dyn Index>> {
        let map = self.indices.read();
        map.get(type_name)
            .and_then(|entry| entry.by_field.get(&normalize_field(field)))
            .cloned()
            .unwrap_or_default()
    }

    /// Add a record to every index registered for its type. Returns the
    /// locators of stored entries, one per index that stored something.
    pub fn add<R: Record + ?Sized>(&self, record: &R) -> Result<Vec<AddResult>> {
        let type_name = record.type_name();
        let lock = self.locks.get(&type_name);
        let _guard = lock.write();

        let Some((pk_field, indices)) = self.snapshot(&type_name) else {
            return Ok(Vec::new());
        };
        let pk = require_field(record, &pk_field)?;

        let mut saga = Saga::new(self.config.rollback_on_failure);
        let mut results = Vec::new();
        for (field, index) in &indices {
            let stored = require_field(record, field).and_then(|value| {
                let locator = index.add(&pk, &value)?;
                Ok((value, locator))
            });
            match stored {
                Ok((value, locator)) => {
                    if !locator.is_empty() {
                        let stored_value = if value.is_empty() {
                            base_name(&locator).to_string()
                        } else {
                            value
                        };
                        saga.added(index, &pk, &stored_value);
                        results.push(AddResult {
                            field: field.clone(),
                            value: locator,
                        });
                    }
                }
                Err(e) => {
                    saga.rollback();
                    return Err(e);
                }
            }
        }
        log::debug!("{type_name} {pk}: added to {} index(es)", indices.len());
        Ok(results)
    }

    /// Exact lookup across the indices of one field. No match is an empty
    /// result, not an error.
    pub fn find_by(&self, type_name: &str, field: &str, value: &str) -> Result<Vec<String>> {
        let lock = self.locks.get(type_name);
        let _guard = lock.read();
        self.collect(type_name, field, |index| index.lookup(value))
    }

    /// Exact lookup over several fields, OR-combined and deduplicated.
    pub fn find_by_fields(&self, type_name: &str, fields: &[Field]) -> Result<Vec<String>> {
        let lock = self.locks.get(type_name);
        let _guard = lock.read();
        let mut keys = Vec::new();
        for field in fields {
            keys.extend(self.collect(type_name, &field.name, |index| index.lookup(&field.value))?);
        }
        Ok(dedup(keys))
    }

    /// Glob search across the indices of one field.
    pub fn find_by_partial(
        &self,
        type_name: &str,
        field: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let lock = self.locks.get(type_name);
        let _guard = lock.read();
        self.collect(type_name, field, |index| index.search(pattern))
    }

    fn collect<F>(&self, type_name: &str, field: &str, find: F) -> Result<Vec<String>>
    where
        F: Fn(&dyn Index) -> Result<Vec<String>>,
    {
        let mut keys = Vec::new();
        for index in self.field_indices(type_name, field) {
            match find(index.as_ref()) {
                Ok(found) => keys.extend(found),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(dedup(keys.into_iter().map(|k| base_name(&k).to_string()).collect()))
    }

    /// Apply the difference between two versions of a record to its indices.
    pub fn update<R: Record + ?Sized>(&self, from: &R, to: &R) -> Result<()> {
        let type_name = from.type_name();
        let to_type = to.type_name();
        if type_name != to_type {
            return Err(IndexerError::TypeMismatch {
                from: type_name,
                to: to_type,
            });
        }
        let lock = self.locks.get(&type_name);
        let _guard = lock.write();

        let Some((pk_field, indices)) = self.snapshot(&type_name) else {
            return Ok(());
        };
        let pk = require_field(from, &pk_field)?;

        let mut saga = Saga::new(self.config.rollback_on_failure);
        for (field, index) in &indices {
            let result = self.update_one(index, field, &pk, from, to, &mut saga);
            if let Err(e) = result {
                saga.rollback();
                return Err(e);
            }
        }
        Ok(())
    }

    fn update_one<R: Record + ?Sized>(
        &self,
        index: &Arc<dyn Index>,
        field: &str,
        pk: &str,
        from: &R,
        to: &R,
        saga: &mut Saga,
    ) -> Result<()> {
        let old = require_field(from, field)?;
        let new = require_field(to, field)?;
        if old == new {
            return Ok(());
        }
        if old.is_empty() {
            let locator = index.add(pk, &new)?;
            saga.added(index, pk, base_name(&locator));
            return Ok(());
        }
        if new.is_empty() {
            index.remove(pk, &old)?;
            saga.removed(index, pk, &old);
            return Ok(());
        }
        index.update(pk, &old, &new)?;
        saga.updated(index, pk, &old, &new);
        log::debug!("{} {pk}: {field} '{old}' -> '{new}'", index.type_name());
        Ok(())
    }

    /// Remove a record from every index registered for its type.
    pub fn delete<R: Record + ?Sized>(&self, record: &R) -> Result<()> {
        let type_name = record.type_name();
        let lock = self.locks.get(&type_name);
        let _guard = lock.write();

        let Some((pk_field, indices)) = self.snapshot(&type_name) else {
            return Ok(());
        };
        let pk = require_field(record, &pk_field)?;

        let mut saga = Saga::new(self.config.rollback_on_failure);
        for (field, index) in &indices {
            let removed = require_field(record, field).and_then(|value| {
                index.remove(&pk, &value)?;
                Ok(value)
            });
            match removed {
                Ok(value) => saga.removed(index, &pk, &value),
                Err(e) => {
                    saga.rollback();
                    return Err(e);
                }
            }
        }
        log::debug!("{type_name} {pk}: removed from {} index(es)", indices.len());
        Ok(())
    }

    /// Delete the backing store of every index and forget all registrations.
    pub fn reset(&self) -> Result<()> {
        let type_names: Vec<String> = self.indices.read().keys().cloned().collect();
        for type_name in type_names {
            let lock = self.locks.get(&type_name);
            let _guard = lock.write();
            let removed = self.indices.write().remove(&type_name);
            if let Some(entry) = removed {
                for (_, index) in entry.all() {
                    index.delete()?;
                }
                log::info!("reset indices of {type_name}");
            }
        }
        Ok(())
    }

    /// Resolve an OData-style filter against the indices of one type.
    pub fn query(&self, type_name: &str, filter: &str) -> Result<Vec<String>> {
        let tree = query::build(filter)?;
        tree.resolve(self, type_name)
    }

    /// Normalized names of the fields indexed for a type.
    pub fn index_fields(&self, type_name: &str) -> Vec<String> {
        let lock = self.locks.get(type_name);
        let _guard = lock.read();
        self.indices
            .read()
            .get(type_name)
            .map(|entry| entry.by_field.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Kinds registered for one field of a type.
    pub fn index_kinds(&self, type_name: &str, field: &str) -> Vec<IndexKind> {
        self.field_indices(type_name, field)
            .iter()
            .map(|index| index.kind())
            .collect()
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("backend", &self.config.repo.backend)
            .field("types", &self.indices.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Drop repeated keys, keeping first-seen order.
pub(crate) fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
