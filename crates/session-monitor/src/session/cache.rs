use std::collections::HashMap;
use std::sync::PoisonError;
use std::sync::RwLock;

/// Process-local scalar store used to correlate timestamps across events.
///
/// Nothing is persisted. Entries stay until their owner removes them; the
/// session service drops a session's schedule time once the session is
/// handed over for deletion.
pub trait ScalarCache: Send + Sync {
    fn get(&self, key: &str) -> Option<i64>;
    fn set(&self, key: &str, value: i64);
    /// Returns the removed value, if any.
    fn remove(&self, key: &str) -> Option<i64>;
}

#[derive(Default)]
pub struct InMemoryScalarCache {
    values: RwLock<HashMap<String, i64>>,
}

impl InMemoryScalarCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScalarCache for InMemoryScalarCache {
    fn get(&self, key: &str) -> Option<i64> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn set(&self, key: &str, value: i64) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<i64> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}
