use super::{Entry, ValueType};
use dashmap::DashMap;

/// Concurrent in-memory store shared by every connection.
///
/// Backed by `DashMap`, so each key lives behind a sharded readers-writer
/// lock: writers to the same shard are mutually exclusive with each other and
/// with in-flight reads. Data is volatile and lost on shutdown.
pub struct MemoryStore {
    data: DashMap<String, Entry>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Fetch the value and its type tag.
    pub fn get(&self, key: &str) -> Option<(String, ValueType)> {
        self.data
            .get(key)
            .map(|entry| (entry.value.clone(), entry.value_type))
    }

    /// Insert or overwrite `key`, returning the entry it displaced.
    pub fn set(&self, key: String, value: String) -> Option<Entry> {
        let entry = Entry::new(key.clone(), value);
        self.data.insert(key, entry)
    }

    /// Remove `key`. Returns true if it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Snapshot of all keys in map iteration order.
    pub fn keys(&self) -> Vec<String> {
        self.data.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
