//! In-memory record store

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::RecordStore;
use crate::error::{Error, Result};

/// Ephemeral [`RecordStore`] backed by an ordered map
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))?;
        Ok(f(&mut entries))
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.with_entries(BTreeMap::clear)
    }
}
