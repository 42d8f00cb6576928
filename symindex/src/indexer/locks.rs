use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// One read/write lock per record type, created on first use and kept for
/// the lifetime of the table.
#[derive(Debug, Default)]
pub struct TypeLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl TypeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `type_name`. Callers hold the returned handle while
    /// they hold its guard.
    pub fn get(&self, type_name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(type_name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
