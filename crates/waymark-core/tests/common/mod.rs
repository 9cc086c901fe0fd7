//! In-memory objective server used by the engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use waymark_core::connectivity::ConnectivityMonitor;
use waymark_core::engine::SyncEngine;
use waymark_core::models::{Objective, ObjectiveId, PendingStatus};
use waymark_core::remote::{ObjectiveService, RemoteError, RemoteResult};
use waymark_core::session::Session;
use waymark_core::store::{MemoryRecordStore, ObjectiveStore, RecordStore};
use waymark_core::Error;

pub const TOKEN: &str = "test-token";
pub const USER: &str = "user-1";

#[derive(Default)]
pub struct FakeServer {
    records: Mutex<BTreeMap<ObjectiveId, Objective>>,
    calls: Mutex<Vec<String>>,
    rejected: Mutex<BTreeSet<ObjectiveId>>,
    offline: AtomicBool,
    next_id: AtomicU64,
    /// Held by a test to park `list` calls
    pub list_gate: tokio::sync::Mutex<()>,
    /// Signalled whenever a `list` call starts
    pub list_entered: Notify,
    /// Held by a test to park `update` calls
    pub update_gate: tokio::sync::Mutex<()>,
    /// Signalled whenever an `update` call starts
    pub update_entered: Notify,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.offline.store(!reachable, Ordering::SeqCst);
    }

    /// Make every update and delete of `id` fail with a server error
    pub fn reject(&self, id: &ObjectiveId) {
        self.rejected.lock().unwrap().insert(id.clone());
    }

    pub fn insert(&self, objective: Objective) {
        let id = objective.id.clone().expect("server records have ids");
        self.records.lock().unwrap().insert(id, objective);
    }

    pub fn record(&self, id: &ObjectiveId) -> Option<Objective> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn records(&self) -> Vec<Objective> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn enter(&self, call: &str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    fn check_rejected(&self, id: &ObjectiveId) -> RemoteResult<()> {
        if self.rejected.lock().unwrap().contains(id) {
            return Err(RemoteError::Api {
                status: 500,
                message: "internal error".into(),
            });
        }
        Ok(())
    }
}

fn not_found() -> RemoteError {
    RemoteError::Api {
        status: 404,
        message: "Objective not found".into(),
    }
}

fn require_id(objective: &Objective) -> RemoteResult<ObjectiveId> {
    objective.id.clone().ok_or_else(|| RemoteError::Api {
        status: 400,
        message: "missing _id".into(),
    })
}

#[async_trait]
impl ObjectiveService for FakeServer {
    async fn list(&self, _token: &str) -> RemoteResult<Vec<Objective>> {
        self.list_entered.notify_one();
        let _held = self.list_gate.lock().await;
        self.enter("list")?;
        Ok(self.records())
    }

    async fn get(&self, _token: &str, id: &ObjectiveId) -> RemoteResult<Objective> {
        self.enter("get")?;
        self.record(id).ok_or_else(not_found)
    }

    async fn create(&self, _token: &str, objective: &Objective) -> RemoteResult<Objective> {
        self.enter("create")?;
        if objective.id.is_some() {
            return Err(RemoteError::Api {
                status: 400,
                message: "create must not carry an _id".into(),
            });
        }
        let number = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut created = objective.clone().with_status(PendingStatus::Synced);
        created.id = Some(ObjectiveId::new(format!("srv-{number}")));
        self.insert(created.clone());
        Ok(created)
    }

    async fn update(&self, _token: &str, objective: &Objective) -> RemoteResult<Objective> {
        self.update_entered.notify_one();
        let _held = self.update_gate.lock().await;
        self.enter("update")?;
        let id = require_id(objective)?;
        self.check_rejected(&id)?;
        let stored = self.record(&id).ok_or_else(not_found)?;
        if objective.version <= stored.version {
            return Err(RemoteError::Api {
                status: 409,
                message: format!(
                    "version {} is not newer than {}",
                    objective.version, stored.version
                ),
            });
        }
        let updated = objective.clone().with_status(PendingStatus::Synced);
        self.insert(updated.clone());
        Ok(updated)
    }

    async fn delete(&self, _token: &str, objective: &Objective) -> RemoteResult<()> {
        self.enter("delete")?;
        let id = require_id(objective)?;
        self.check_rejected(&id)?;
        self.records
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(not_found)
    }
}

/// Memory store whose writes can be switched to fail
#[derive(Default)]
pub struct FailingWrites {
    inner: MemoryRecordStore,
    failing: AtomicBool,
}

impl FailingWrites {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RecordStore for FailingWrites {
    fn get(&self, key: &str) -> waymark_core::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> waymark_core::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> waymark_core::Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> waymark_core::Result<Vec<String>> {
        self.inner.keys()
    }

    fn clear(&self) -> waymark_core::Result<()> {
        self.inner.clear()
    }
}

pub fn session() -> Session {
    Session::new(TOKEN, USER)
}

/// Objective as the server would hand it out
pub fn server_objective(id: &str, name: &str, version: u64) -> Objective {
    let mut objective = Objective::new(name, USER);
    objective.id = Some(ObjectiveId::new(id));
    objective.version = version;
    objective
}

pub struct Harness {
    pub server: Arc<FakeServer>,
    pub store: ObjectiveStore,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        Self::with_store(online, ObjectiveStore::in_memory())
    }

    pub fn with_store(online: bool, store: ObjectiveStore) -> Self {
        let server = FakeServer::new();
        server.set_reachable(online);
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            server.clone(),
            ConnectivityMonitor::new(online),
            session(),
        ));
        Self {
            server,
            store,
            engine,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.server.set_reachable(online);
        self.engine.connectivity().set_online(online);
    }

    pub fn stored(&self, id: &ObjectiveId) -> Option<Objective> {
        self.store.load(id).unwrap()
    }
}
