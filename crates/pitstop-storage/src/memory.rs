//! In-memory backend for tests and ephemeral sessions.

use crate::{KeyValueStore, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local key-value store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();

        store.set("test_key", "test_value").unwrap();
        assert_eq!(store.get("test_key").unwrap(), Some("test_value".to_string()));

        assert!(store.has("test_key").unwrap());
        assert!(!store.has("nonexistent").unwrap());

        assert!(store.delete("test_key").unwrap());
        assert!(!store.delete("test_key").unwrap());
        assert_eq!(store.get("test_key").unwrap(), None);
    }

    #[test]
    fn test_multi_remove_counts_existing_keys() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        assert_eq!(store.multi_remove(&["a", "b", "c"]).unwrap(), 2);
        assert!(!store.has("a").unwrap());
        assert!(!store.has("b").unwrap());
    }
}
