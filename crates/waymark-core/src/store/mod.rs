//! Local record store
//!
//! A durable key-value store mapping record identity to the serialized
//! objective. It is the single source of truth for what the client currently
//! believes, including records whose mutations have not reached the server.

mod memory;
mod migrations;
mod sqlite;

use std::sync::Arc;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::error::{Error, Result};
use crate::models::{Objective, ObjectiveId, PendingStatus};

/// Raw key-value storage operations
///
/// Keys are identity strings; `keys` returns them in ascending order, which is
/// the enumeration order the sync engine drains in.
pub trait RecordStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys, ascending
    fn keys(&self) -> Result<Vec<String>>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;
}

/// Stored entry that could not be decoded as an objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub key: String,
    pub reason: String,
}

/// Snapshot of the store in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct StoreScan {
    pub records: Vec<Objective>,
    pub malformed: Vec<MalformedEntry>,
}

/// Typed view over a [`RecordStore`] holding objectives
#[derive(Clone)]
pub struct ObjectiveStore {
    inner: Arc<dyn RecordStore>,
}

impl ObjectiveStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self { inner }
    }

    /// Store backed by a fresh in-memory map
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    /// Raw backend, for callers that need to bypass decoding
    pub fn raw(&self) -> &dyn RecordStore {
        self.inner.as_ref()
    }

    /// Load one objective; malformed payloads surface as errors here
    pub fn load(&self, id: &ObjectiveId) -> Result<Option<Objective>> {
        self.inner
            .get(id.as_str())?
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    /// Persist `objective` under its identity, overwriting any previous value
    pub fn put(&self, objective: &Objective) -> Result<()> {
        let id = objective.id.as_ref().ok_or_else(|| {
            Error::InvalidInput("cannot store an objective without identity".into())
        })?;
        let value = serde_json::to_string(objective)?;
        self.inner.set(id.as_str(), &value)
    }

    /// Remove the entry for `id` entirely
    pub fn purge(&self, id: &ObjectiveId) -> Result<()> {
        self.inner.remove(id.as_str())
    }

    /// Decode every entry in key order, setting malformed ones aside
    pub fn scan(&self) -> Result<StoreScan> {
        let mut scan = StoreScan::default();
        for key in self.inner.keys()? {
            let Some(raw) = self.inner.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<Objective>(&raw) {
                Ok(objective) => scan.records.push(objective),
                Err(error) => {
                    tracing::warn!("Skipping malformed stored record {key}: {error}");
                    scan.malformed.push(MalformedEntry {
                        key,
                        reason: error.to_string(),
                    });
                }
            }
        }
        Ok(scan)
    }

    /// Count decodable records per pending status
    pub fn pending_counts(&self) -> Result<PendingCounts> {
        let scan = self.scan()?;
        let mut counts = PendingCounts {
            malformed: scan.malformed.len(),
            ..PendingCounts::default()
        };
        for record in &scan.records {
            match record.status {
                PendingStatus::Synced => counts.synced += 1,
                PendingStatus::PendingCreate => counts.pending_create += 1,
                PendingStatus::PendingUpdate => counts.pending_update += 1,
                PendingStatus::PendingDelete => counts.pending_delete += 1,
            }
        }
        Ok(counts)
    }

    /// Drop every stored record
    pub fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

/// Per-status record counts of the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PendingCounts {
    pub synced: usize,
    pub pending_create: usize,
    pub pending_update: usize,
    pub pending_delete: usize,
    pub malformed: usize,
}

impl PendingCounts {
    /// Records still waiting for a drain
    pub const fn pending(&self) -> usize {
        self.pending_create + self.pending_update + self.pending_delete
    }
}
