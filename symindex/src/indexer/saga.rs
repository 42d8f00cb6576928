use crate::index::Index;
use std::sync::Arc;

/// The inverse of an index mutation that already succeeded.
enum Compensation {
    Add {
        index: Arc<dyn Index>,
        id: String,
        value: String,
    },
    Remove {
        index: Arc<dyn Index>,
        id: String,
        value: String,
    },
    Update {
        index: Arc<dyn Index>,
        id: String,
        from: String,
        to: String,
    },
}

/// Compensating actions for a multi-index write. When disabled nothing is
/// recorded and `rollback` does nothing, leaving partial state behind.
pub(crate) struct Saga {
    enabled: bool,
    steps: Vec<Compensation>,
}

impl Saga {
    pub(crate) fn new(enabled: bool) -> Self {
        Saga {
            enabled,
            steps: Vec::new(),
        }
    }

    /// Record that `value -> id` was added.
    pub(crate) fn added(&mut self, index: &Arc<dyn Index>, id: &str, value: &str) {
        if self.enabled && !value.is_empty() {
            self.steps.push(Compensation::Remove {
                index: index.clone(),
                id: id.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Record that `value -> id` was removed.
    pub(crate) fn removed(&mut self, index: &Arc<dyn Index>, id: &str, value: &str) {
        if self.enabled && !value.is_empty() {
            self.steps.push(Compensation::Add {
                index: index.clone(),
                id: id.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Record that `id` moved from `old` to `new`.
    pub(crate) fn updated(&mut self, index: &Arc<dyn Index>, id: &str, old: &str, new: &str) {
        if self.enabled {
            self.steps.push(Compensation::Update {
                index: index.clone(),
                id: id.to_string(),
                from: new.to_string(),
                to: old.to_string(),
            });
        }
    }

    /// Undo the recorded steps, newest first. Failures are logged and skipped.
    pub(crate) fn rollback(self) {
        if self.steps.is_empty() {
            return;
        }
        log::warn!("rolling back {} index mutation(s)", self.steps.len());
        for step in self.steps.into_iter().rev() {
            let result = match &step {
                Compensation::Add { index, id, value } => index.add(id, value).map(|_| ()),
                Compensation::Remove { index, id, value } => index.remove(id, value),
                Compensation::Update {
                    index,
                    id,
                    from,
                    to,
                } => index.update(id, from, to),
            };
            if let Err(e) = result {
                let index = match &step {
                    Compensation::Add { index, .. }
                    | Compensation::Remove { index, .. }
                    | Compensation::Update { index, .. } => index,
                };
                log::warn!("rollback step on {} failed: {e}", index.root_dir());
            }
        }
    }
}
