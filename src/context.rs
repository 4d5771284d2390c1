use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::util::lock_unpoisoned;

/// Shared key-value storage scoped to one call execution.
///
/// Every chain hop of a call sees the same instance, so interceptors can hand
/// cross-cutting data (timings, request ids, error counters) down and back up
/// the pipeline without changing the request type. Values are stored behind
/// [`Arc`] and retrieved by type; a lookup with the wrong type returns `None`.
///
/// One hop is active at a time within a call, but hops may resume on different
/// worker threads, so access goes through a mutex.
#[derive(Clone, Default)]
pub struct CallContext {
    values: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        lock_unpoisoned(&self.values).insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = lock_unpoisoned(&self.values).get(key).cloned()?;
        Arc::downcast(value).ok()
    }

    /// Removes `key`, reporting whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        lock_unpoisoned(&self.values).remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock_unpoisoned(&self.values).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.values).is_empty()
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CallContext")
            .field("len", &self.len())
            .finish()
    }
}
