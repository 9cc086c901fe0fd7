//! Offline sync engine
//!
//! Decides for every user mutation whether to go to the server or queue it
//! locally, replays queued mutations once connectivity returns, and checks
//! for version conflicts before edits.

use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::conflict::{self, ConflictCheck, EditDraft, Resolution};
use crate::connectivity::ConnectivityMonitor;
use crate::dispatch::{EventLoop, StateSnapshot};
use crate::error::{Error, Result};
use crate::feed;
use crate::models::{Objective, ObjectiveId, PendingStatus};
use crate::reducer::{ObjectivesState, SyncEvent};
use crate::remote::{ObjectiveService, RemoteError};
use crate::session::Session;
use crate::state::SyncState;
use crate::store::ObjectiveStore;

const NOTICE_CAPACITY: usize = 64;

/// Informational, dismissible message for the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The change was kept on this device and will be sent later
    SavedLocally(Objective),
    /// The deletion was recorded on this device and will be sent later
    DeletedLocally(Objective),
}

/// Where a save ended up
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Confirmed by the server; carries the canonical record
    Remote(Objective),
    /// Queued locally with a pending status
    Local(Objective),
    /// Server copy adopted without a remote write
    Adopted(Objective),
}

impl SaveOutcome {
    pub const fn objective(&self) -> &Objective {
        match self {
            Self::Remote(objective) | Self::Local(objective) | Self::Adopted(objective) => {
                objective
            }
        }
    }

    pub fn into_objective(self) -> Objective {
        match self {
            Self::Remote(objective) | Self::Local(objective) | Self::Adopted(objective) => {
                objective
            }
        }
    }
}

/// Where a delete ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Deleted on the server and purged locally
    Remote,
    /// Tombstoned locally, waiting for the next drain
    Local,
    /// Never reached the server; purged locally
    Discarded,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DrainReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub malformed: usize,
    /// The session changed before every record was visited
    pub interrupted: bool,
}

impl DrainReport {
    /// Records that reached the server in this pass
    pub const fn replayed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Options for the background loop
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Websocket URL of the live feed; the feed is not observed when `None`
    pub feed_url: Option<String>,
}

#[derive(Clone)]
struct ActiveSession {
    session: Session,
    cancel: CancellationToken,
}

impl ActiveSession {
    fn new(session: Session) -> Self {
        Self {
            session,
            cancel: CancellationToken::new(),
        }
    }

    fn token(&self) -> &str {
        &self.session.token
    }
}

pub struct SyncEngine {
    store: ObjectiveStore,
    remote: Arc<dyn ObjectiveService>,
    connectivity: ConnectivityMonitor,
    events: EventLoop,
    active: RwLock<ActiveSession>,
    generation: watch::Sender<u64>,
    notices: broadcast::Sender<Notice>,
    status: watch::Sender<SyncState>,
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    /// Build an engine for `session`. Must be called inside a tokio runtime.
    pub fn new(
        store: ObjectiveStore,
        remote: Arc<dyn ObjectiveService>,
        connectivity: ConnectivityMonitor,
        session: Session,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let initial_status = if connectivity.is_online() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (status, _) = watch::channel(initial_status);
        let (generation, _) = watch::channel(0);
        Self {
            store,
            remote,
            connectivity,
            events: EventLoop::spawn(),
            active: RwLock::new(ActiveSession::new(session)),
            generation,
            notices,
            status,
            drain_lock: Mutex::new(()),
        }
    }

    pub const fn store(&self) -> &ObjectiveStore {
        &self.store
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Current collection state (may lag behind queued events)
    pub fn state(&self) -> ObjectivesState {
        self.events.state()
    }

    /// Collection state once every dispatched event has been applied
    pub async fn settled(&self) -> ObjectivesState {
        self.events.settled().await
    }

    pub fn watch_state(&self) -> watch::Receiver<StateSnapshot> {
        self.events.watch()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe_events()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        *self.status.borrow()
    }

    pub fn watch_sync_state(&self) -> watch::Receiver<SyncState> {
        self.status.subscribe()
    }

    pub async fn session(&self) -> Session {
        self.active.read().await.session.clone()
    }

    async fn current(&self) -> ActiveSession {
        self.active.read().await.clone()
    }

    /// Dispatch unless the session that produced the event has ended
    fn emit(&self, ctx: &ActiveSession, event: SyncEvent) {
        if ctx.cancel.is_cancelled() {
            tracing::debug!("Dropping {} from a superseded session", event.name());
            return;
        }
        self.events.dispatcher().dispatch(event);
    }

    fn notify(&self, ctx: &ActiveSession, notice: Notice) {
        if !ctx.cancel.is_cancelled() {
            let _ = self.notices.send(notice);
        }
    }

    fn set_status(&self, state: SyncState) {
        self.status.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Replace the session; in-flight work of the previous one stops
    /// dispatching and the background loop resubscribes.
    pub async fn switch_session(&self, session: Session) {
        {
            let mut active = self.active.write().await;
            active.cancel.cancel();
            *active = ActiveSession::new(session);
        }
        self.generation.send_modify(|generation| *generation += 1);
        tracing::info!("Session switched");
    }

    /// End the current session without starting a new one
    pub async fn shutdown(&self) {
        self.active.read().await.cancel.cancel();
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    /// Load the collection from the server, falling back to the local store.
    pub async fn fetch(&self) -> Result<Vec<Objective>> {
        let ctx = self.current().await;
        if !ctx.session.is_authenticated() {
            tracing::debug!("Skipping fetch without credentials");
            return Ok(Vec::new());
        }

        self.emit(&ctx, SyncEvent::FetchStarted);
        match self.remote.list(ctx.token()).await {
            Ok(objectives) => {
                if ctx.cancel.is_cancelled() {
                    tracing::debug!("Discarding fetch result of a superseded session");
                    return Ok(objectives);
                }
                for objective in &objectives {
                    if let Err(error) = self.store.put(objective) {
                        tracing::warn!("Failed to cache fetched objective: {error}");
                    }
                }
                tracing::info!("Fetched {} objectives", objectives.len());
                self.emit(&ctx, SyncEvent::FetchSucceeded(objectives.clone()));
                Ok(objectives)
            }
            Err(error) => {
                tracing::warn!("Fetch failed, serving cached objectives: {error}");
                let objectives = self.cached_objectives()?;
                let error = objectives.is_empty().then(|| error.to_string());
                self.emit(
                    &ctx,
                    SyncEvent::FetchFailed {
                        objectives: objectives.clone(),
                        error,
                    },
                );
                Ok(objectives)
            }
        }
    }

    /// Degraded view of the local store: everything except records with an
    /// unsent update.
    pub fn cached_objectives(&self) -> Result<Vec<Objective>> {
        let scan = self.store.scan()?;
        Ok(scan
            .records
            .into_iter()
            .filter(|objective| objective.status != PendingStatus::PendingUpdate)
            .collect())
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Save a user-submitted record.
    ///
    /// Network failures never surface here: the record is queued locally
    /// instead. Only local store failures are returned as errors.
    pub async fn save(&self, objective: Objective, connected: bool) -> Result<SaveOutcome> {
        let ctx = self.current().await;

        if connected && ctx.session.is_authenticated() {
            self.emit(&ctx, SyncEvent::SaveStarted);
            match self.save_remote(&ctx, &objective).await {
                Ok(saved) => return self.commit_remote_save(&ctx, &objective, saved),
                Err(error) => {
                    tracing::warn!("Remote save failed, keeping change locally: {error}");
                }
            }
        }

        self.save_offline(&ctx, objective)
    }

    async fn save_remote(
        &self,
        ctx: &ActiveSession,
        objective: &Objective,
    ) -> std::result::Result<Objective, RemoteError> {
        let outgoing = objective.clone().with_status(PendingStatus::Synced);
        if outgoing.server_id().is_some() {
            self.remote.update(ctx.token(), &outgoing).await
        } else {
            let mut outgoing = outgoing;
            outgoing.id = None;
            self.remote.create(ctx.token(), &outgoing).await
        }
    }

    fn commit_remote_save(
        &self,
        ctx: &ActiveSession,
        submitted: &Objective,
        saved: Objective,
    ) -> Result<SaveOutcome> {
        if let Err(error) = self.store.put(&saved) {
            self.emit(ctx, SyncEvent::SaveFailed(error.to_string()));
            return Err(error);
        }
        // A record first queued offline now has its server identity
        if let Some(temp_id) = submitted.id.as_ref().filter(|id| id.is_temporary()) {
            self.store.purge(temp_id)?;
            self.emit(ctx, SyncEvent::DeleteSucceeded(submitted.clone()));
        }
        tracing::debug!("Saved objective {:?} remotely", saved.id);
        self.emit(ctx, SyncEvent::SaveSucceeded(saved.clone()));
        self.emit(ctx, SyncEvent::ConflictResolved);
        Ok(SaveOutcome::Remote(saved))
    }

    fn save_offline(&self, ctx: &ActiveSession, mut record: Objective) -> Result<SaveOutcome> {
        let notice = match &record.id {
            None => {
                record.id = Some(ObjectiveId::temporary());
                record.status = PendingStatus::PendingCreate;
                false
            }
            Some(id) if id.is_temporary() => {
                record.status = PendingStatus::PendingCreate;
                false
            }
            Some(_) => {
                record.status = PendingStatus::PendingUpdate;
                true
            }
        };

        if let Err(error) = self.store.put(&record) {
            self.emit(ctx, SyncEvent::SaveFailed(error.to_string()));
            return Err(error);
        }
        tracing::info!("Objective {:?} saved locally ({})", record.id, record.status);
        if notice {
            self.notify(ctx, Notice::SavedLocally(record.clone()));
        }
        self.emit(ctx, SyncEvent::SaveSucceededOffline(record.clone()));
        Ok(SaveOutcome::Local(record))
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a record, optimistically when the server is unreachable.
    pub async fn delete(&self, objective: Objective, connected: bool) -> Result<DeleteOutcome> {
        let ctx = self.current().await;
        let id = objective
            .id
            .clone()
            .ok_or_else(|| Error::InvalidInput("cannot delete an unsaved objective".into()))?;

        if id.is_temporary() {
            self.store.purge(&id)?;
            tracing::info!("Discarded never-synced objective {id}");
            self.emit(&ctx, SyncEvent::DeleteSucceeded(objective));
            return Ok(DeleteOutcome::Discarded);
        }

        if connected && ctx.session.is_authenticated() {
            self.emit(&ctx, SyncEvent::DeleteStarted);
            match self.remote.delete(ctx.token(), &objective).await {
                Ok(()) => {
                    if let Err(error) = self.store.purge(&id) {
                        self.emit(&ctx, SyncEvent::DeleteFailed(error.to_string()));
                        return Err(error);
                    }
                    self.emit(&ctx, SyncEvent::DeleteSucceeded(objective));
                    return Ok(DeleteOutcome::Remote);
                }
                Err(error) => {
                    tracing::warn!("Remote delete failed, keeping tombstone locally: {error}");
                }
            }
        }

        let tombstone = objective.with_status(PendingStatus::PendingDelete);
        if let Err(error) = self.store.put(&tombstone) {
            self.emit(&ctx, SyncEvent::DeleteFailed(error.to_string()));
            return Err(error);
        }
        tracing::info!("Objective {id} deleted locally");
        self.notify(&ctx, Notice::DeletedLocally(tombstone.clone()));
        self.emit(&ctx, SyncEvent::DeleteSucceeded(tombstone));
        Ok(DeleteOutcome::Local)
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    /// Replay every queued mutation against the server.
    ///
    /// Records are visited in store order, one remote call at a time. A failed
    /// record keeps its pending status for the next pass; the pass continues.
    pub async fn drain(&self) -> Result<DrainReport> {
        let _guard = self.drain_lock.lock().await;
        let ctx = self.current().await;
        let mut report = DrainReport::default();
        if !ctx.session.is_authenticated() {
            tracing::debug!("Skipping drain without credentials");
            return Ok(report);
        }

        let scan = self.store.scan()?;
        report.malformed = scan.malformed.len();
        let pending = scan
            .records
            .iter()
            .filter(|record| record.status.is_pending())
            .count();
        if pending == 0 {
            tracing::debug!("Nothing to drain");
            self.finish_drain(&report);
            return Ok(report);
        }

        self.set_status(SyncState::Syncing);
        tracing::info!("Draining {pending} pending objectives");

        for snapshot in scan.records {
            if ctx.cancel.is_cancelled() {
                tracing::info!("Drain interrupted by session change");
                report.interrupted = true;
                break;
            }
            if !snapshot.status.is_pending() {
                continue;
            }
            let Some(id) = snapshot.id else {
                continue;
            };

            // Earlier replays awaited the network; the user may have saved or
            // deleted this record since the scan.
            let record = match self.store.load(&id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::debug!("Objective {id} removed since the scan, skipping");
                    continue;
                }
                Err(error) => {
                    tracing::warn!("Could not reload {id} before replay: {error}");
                    report.failed += 1;
                    continue;
                }
            };

            let status = record.status;
            let outcome = match status {
                PendingStatus::Synced => continue,
                PendingStatus::PendingCreate => self.replay_create(&ctx, record).await,
                PendingStatus::PendingUpdate => self.replay_update(&ctx, record).await,
                PendingStatus::PendingDelete => self.replay_delete(&ctx, record).await,
            };

            match (outcome, status) {
                (Ok(()), PendingStatus::PendingCreate) => report.created += 1,
                (Ok(()), PendingStatus::PendingUpdate) => report.updated += 1,
                (Ok(()), _) => report.deleted += 1,
                (Err(error), _) => {
                    tracing::warn!("Replay of {status} for {id} failed, will retry: {error}");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Drain finished: {} created, {} updated, {} deleted, {} failed",
            report.created,
            report.updated,
            report.deleted,
            report.failed
        );
        self.finish_drain(&report);
        Ok(report)
    }

    fn finish_drain(&self, report: &DrainReport) {
        if report.failed > 0 {
            self.set_status(SyncState::Error);
        } else if self.connectivity.is_online() {
            self.set_status(SyncState::Synced);
        } else {
            self.set_status(SyncState::Offline);
        }
    }

    /// Whether the store still holds exactly `record`
    fn still_stored(&self, record: &Objective) -> Result<bool> {
        let Some(id) = &record.id else {
            return Ok(false);
        };
        Ok(self.store.load(id)?.as_ref() == Some(record))
    }

    async fn replay_create(&self, ctx: &ActiveSession, record: Objective) -> Result<()> {
        let mut outgoing = record.clone().with_status(PendingStatus::Synced);
        outgoing.id = None;
        let created = self.remote.create(ctx.token(), &outgoing).await?;
        let Some(temp_id) = record.id.clone() else {
            return Ok(());
        };

        match self.store.load(&temp_id)? {
            Some(current) if current == record => {
                self.store.put(&created)?;
                self.store.purge(&temp_id)?;
                tracing::debug!("Replayed create {temp_id} -> {:?}", created.id);
                self.emit(ctx, SyncEvent::DeleteSucceeded(record));
                self.emit(ctx, SyncEvent::SaveSucceeded(created));
            }
            // Edited while the create was in flight: keep the edit as an
            // update of the server record.
            Some(current) => {
                let mut pending = created.clone();
                pending.copy_fields_from(&current);
                pending.version = created.version.saturating_add(1);
                pending.status = PendingStatus::PendingUpdate;
                self.store.put(&pending)?;
                self.store.purge(&temp_id)?;
                tracing::debug!("Create {temp_id} changed in flight, queued update");
                self.emit(ctx, SyncEvent::DeleteSucceeded(current));
                self.emit(ctx, SyncEvent::SaveSucceededOffline(pending));
            }
            // Discarded while the create was in flight: delete it remotely later.
            None => {
                let tombstone = created.with_status(PendingStatus::PendingDelete);
                self.store.put(&tombstone)?;
                tracing::debug!("Create {temp_id} discarded in flight, queued delete");
            }
        }
        Ok(())
    }

    async fn replay_update(&self, ctx: &ActiveSession, record: Objective) -> Result<()> {
        let outgoing = record.clone().with_status(PendingStatus::Synced);
        let updated = self.remote.update(ctx.token(), &outgoing).await?;
        let Some(id) = &record.id else {
            return Ok(());
        };

        match self.store.load(id)? {
            Some(current) if current == record => {
                self.store.put(&updated)?;
                tracing::debug!("Replayed update {id}");
                self.emit(ctx, SyncEvent::SaveSucceeded(updated));
            }
            // Edited again while in flight: send the newer fields on top of
            // the version the server just accepted.
            Some(mut current) if current.status == PendingStatus::PendingUpdate => {
                if current.version <= updated.version {
                    current.version = updated.version.saturating_add(1);
                    self.store.put(&current)?;
                }
                tracing::debug!("Objective {id} edited in flight, queued v{}", current.version);
            }
            _ => tracing::debug!("Objective {id} changed in flight, keeping local change"),
        }
        Ok(())
    }

    async fn replay_delete(&self, ctx: &ActiveSession, record: Objective) -> Result<()> {
        match self.remote.delete(ctx.token(), &record).await {
            Ok(()) => {}
            // Already gone on the server; the tombstone has nothing left to do
            Err(RemoteError::Api { status: 404, .. }) => {
                tracing::debug!("Objective {:?} already deleted remotely", record.id);
            }
            Err(error) => return Err(error.into()),
        }
        if let Some(id) = &record.id {
            if self.still_stored(&record)? {
                self.store.purge(id)?;
            }
        }
        tracing::debug!("Replayed delete {:?}", record.id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    /// Re-fetch `id` and compare it with the version the edit starts from.
    pub async fn check_conflict(&self, id: &ObjectiveId, base_version: u64) -> ConflictCheck {
        if id.is_temporary() {
            return ConflictCheck::Clean;
        }
        let ctx = self.current().await;
        if !ctx.session.is_authenticated() {
            return ConflictCheck::Unverified;
        }

        match self.remote.get(ctx.token(), id).await {
            Ok(server) => {
                let check = conflict::detect(base_version, server);
                if let ConflictCheck::Conflict(server) = &check {
                    tracing::info!(
                        "Conflict on {id}: editing version {base_version}, server has {}",
                        server.version
                    );
                    self.emit(&ctx, SyncEvent::ConflictDetected(server.clone()));
                }
                check
            }
            Err(error) => {
                tracing::debug!("Could not verify {id} before editing: {error}");
                ConflictCheck::Unverified
            }
        }
    }

    /// Open a stored record for editing and check it against the server.
    pub async fn open_for_edit(&self, id: &ObjectiveId) -> Result<(EditDraft, ConflictCheck)> {
        let mut baseline = self
            .store
            .load(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        // A queued update already carries the version it will be sent with
        if baseline.status == PendingStatus::PendingUpdate {
            baseline.version = baseline.version.saturating_sub(1);
        }
        let check = self.check_conflict(id, baseline.version).await;
        Ok((EditDraft::open(baseline), check))
    }

    /// Conclude a conflict with the user's choice.
    pub async fn resolve_conflict(
        &self,
        draft: EditDraft,
        server: &Objective,
        resolution: Resolution,
        connected: bool,
    ) -> Result<SaveOutcome> {
        let record = draft.resolve(server, resolution);
        let outcome = match resolution {
            Resolution::KeepLocal => self.save(record, connected).await?,
            Resolution::AcceptServer => self.adopt(record).await?,
        };
        let ctx = self.current().await;
        self.emit(&ctx, SyncEvent::ConflictResolved);
        Ok(outcome)
    }

    /// Store the server copy as the local truth without a remote write
    async fn adopt(&self, server: Objective) -> Result<SaveOutcome> {
        let ctx = self.current().await;
        let record = server.with_status(PendingStatus::Synced);
        if let Err(error) = self.store.put(&record) {
            self.emit(&ctx, SyncEvent::SaveFailed(error.to_string()));
            return Err(error);
        }
        self.emit(&ctx, SyncEvent::SaveSucceeded(record.clone()));
        Ok(SaveOutcome::Adopted(record))
    }

    // ------------------------------------------------------------------
    // Background loop
    // ------------------------------------------------------------------

    /// Drain on every offline → online transition, refetch and resubscribe on
    /// session changes, until `shutdown` fires.
    pub async fn run(self: Arc<Self>, options: RunOptions, shutdown: CancellationToken) {
        let mut connectivity = self.connectivity.subscribe();
        let mut generations = self.generation.subscribe();
        let mut was_online = *connectivity.borrow_and_update();
        generations.borrow_and_update();

        if !was_online {
            self.set_status(SyncState::Offline);
        }
        self.start_session(&options, was_online).await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *connectivity.borrow_and_update();
                    if online && !was_online {
                        self.drain_logged().await;
                    } else if !online {
                        self.set_status(SyncState::Offline);
                    }
                    was_online = online;
                }
                changed = generations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    generations.borrow_and_update();
                    self.start_session(&options, was_online).await;
                }
            }
        }

        self.shutdown().await;
        tracing::info!("Sync loop stopped");
    }

    async fn start_session(self: &Arc<Self>, options: &RunOptions, online: bool) {
        if online {
            self.drain_logged().await;
        }
        if let Err(error) = self.fetch().await {
            tracing::warn!("Initial fetch failed: {error}");
        }
        if let Some(url) = &options.feed_url {
            let engine = Arc::clone(self);
            let url = url.clone();
            tokio::spawn(async move { engine.observe_feed(&url).await });
        }
    }

    async fn drain_logged(&self) {
        if let Err(error) = self.drain().await {
            tracing::warn!("Drain aborted: {error}");
            self.set_status(SyncState::Error);
        }
    }

    /// Log live notifications for the current session until it ends.
    pub async fn observe_feed(&self, url: &str) {
        let ctx = self.current().await;
        if !ctx.session.is_authenticated() {
            return;
        }
        let cancel = ctx.cancel.child_token();
        let mut subscription = match feed::subscribe(url, &ctx.session, cancel.clone()).await {
            Ok(subscription) => subscription,
            Err(error) => {
                tracing::warn!("Live feed unavailable: {error}");
                return;
            }
        };

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = subscription.messages.recv() => message,
            };
            let Some(message) = message else {
                break;
            };
            tracing::info!(
                "Feed: objective {:?} {:?}",
                message.payload.as_ref().and_then(|objective| objective.id.as_ref()),
                message.kind
            );
        }
        subscription.close();
    }
}
