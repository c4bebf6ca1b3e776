use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::DataManagerError;

/// Durable string storage, keyed by a handful of fixed names.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError>;
    fn remove(&mut self, key: &str) -> Result<(), DataManagerError>;
}

/// In-process store. Clones share the same entries.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, DataManagerError> {
        self.entries
            .lock()
            .map_err(|_| DataManagerError::Store("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataManagerError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), DataManagerError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), DataManagerError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[test]
fn clones_share_entries() {
    let mut store = MemoryStore::new();
    let view = store.clone();

    store.set("a", "1").unwrap();
    assert_eq!(view.get("a").unwrap().as_deref(), Some("1"));
    assert!(view.contains("a"));

    store.remove("a").unwrap();
    assert_eq!(view.get("a").unwrap(), None);
    assert!(!view.contains("a"));
}
