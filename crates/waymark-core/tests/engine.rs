mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{server_objective, FailingWrites, Harness, USER};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use waymark_core::conflict::{ConflictCheck, EditDraft, Resolution};
use waymark_core::engine::{DeleteOutcome, Notice, RunOptions, SaveOutcome};
use waymark_core::models::{Objective, ObjectiveId, PendingStatus};
use waymark_core::reducer::SyncEvent;
use waymark_core::session::Session;
use waymark_core::store::ObjectiveStore;
use waymark_core::state::SyncState;

fn draft(name: &str) -> Objective {
    let mut objective = Objective::new(name, USER);
    objective.city = "Lisbon".into();
    objective
}

#[tokio::test]
async fn offline_create_is_replayed_under_server_identity() {
    let harness = Harness::new(false);

    let outcome = harness.engine.save(draft("Castle"), false).await.unwrap();
    let SaveOutcome::Local(local) = outcome else {
        panic!("expected a local save, got {outcome:?}");
    };
    let temp_id = local.id.clone().unwrap();
    assert!(temp_id.is_temporary());
    assert_eq!(local.status, PendingStatus::PendingCreate);
    assert_eq!(harness.server.call_count(), 0);

    let state = harness.engine.settled().await;
    assert_eq!(state.objectives, vec![local.clone()]);

    harness.set_online(true);
    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);

    let server = harness.server.records();
    assert_eq!(server.len(), 1);
    let server_id = server[0].id.clone().unwrap();
    assert!(!server_id.is_temporary());
    assert_eq!(server[0].name, "Castle");

    assert_eq!(harness.stored(&temp_id), None);
    let stored = harness.stored(&server_id).unwrap();
    assert_eq!(stored.status, PendingStatus::Synced);

    let state = harness.engine.settled().await;
    assert_eq!(state.objectives.len(), 1);
    assert_eq!(state.objectives[0].id, Some(server_id));
    assert_eq!(harness.engine.sync_state(), SyncState::Synced);
}

#[tokio::test]
async fn second_drain_makes_no_remote_calls() {
    let harness = Harness::new(false);
    harness.engine.save(draft("Tower"), false).await.unwrap();

    harness.set_online(true);
    harness.engine.drain().await.unwrap();
    let calls = harness.server.call_count();

    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.replayed(), 0);
    assert_eq!(report.failed, 0);
    assert_eq!(harness.server.call_count(), calls);
}

#[tokio::test]
async fn online_save_returns_canonical_record() {
    let harness = Harness::new(true);

    let outcome = harness.engine.save(draft("Bridge"), true).await.unwrap();
    let SaveOutcome::Remote(saved) = outcome else {
        panic!("expected a remote save, got {outcome:?}");
    };
    let id = saved.id.clone().unwrap();
    assert_eq!(id.as_str(), "srv-1");
    assert_eq!(harness.stored(&id), Some(saved.clone()));

    let state = harness.engine.settled().await;
    assert_eq!(state.objectives, vec![saved]);
    assert!(!state.saving);
    assert_eq!(state.save_error, None);
}

#[tokio::test]
async fn failed_online_save_falls_back_to_local_queue() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-9", "Museum", 1));
    harness.engine.fetch().await.unwrap();
    let mut notices = harness.engine.subscribe_notices();

    harness.server.set_reachable(false);
    let (mut edit, check) = harness
        .engine
        .open_for_edit(&ObjectiveId::new("srv-9"))
        .await
        .unwrap();
    assert_eq!(check, ConflictCheck::Unverified);
    edit.fields.name = "Museum of Art".into();

    let outcome = harness
        .engine
        .save(edit.into_record(), true)
        .await
        .unwrap();
    let SaveOutcome::Local(local) = outcome else {
        panic!("expected a local save, got {outcome:?}");
    };
    assert_eq!(local.status, PendingStatus::PendingUpdate);
    assert_eq!(local.version, 2);
    assert_eq!(notices.try_recv().unwrap(), Notice::SavedLocally(local.clone()));

    let state = harness.engine.settled().await;
    assert_eq!(state.find(&ObjectiveId::new("srv-9")), Some(&local));
    assert!(!state.saving);
}

#[tokio::test]
async fn offline_edits_reach_the_server_with_increasing_versions() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-1", "Square", 1));
    harness.engine.fetch().await.unwrap();
    harness.set_online(false);

    let id = ObjectiveId::new("srv-1");
    for name in ["Square 2", "Square 3"] {
        let (mut edit, _) = harness.engine.open_for_edit(&id).await.unwrap();
        edit.fields.name = name.into();
        harness.engine.save(edit.into_record(), false).await.unwrap();
    }
    let queued = harness.stored(&id).unwrap();
    assert_eq!(queued.version, 2);
    assert_eq!(queued.status, PendingStatus::PendingUpdate);

    harness.set_online(true);
    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.updated, 1);

    let server = harness.server.record(&id).unwrap();
    assert_eq!(server.version, 2);
    assert_eq!(server.name, "Square 3");
    assert_eq!(harness.stored(&id).unwrap().status, PendingStatus::Synced);
}

#[tokio::test]
async fn editing_a_queued_create_keeps_it_a_create() {
    let harness = Harness::new(false);
    let SaveOutcome::Local(local) = harness.engine.save(draft("Park"), false).await.unwrap() else {
        panic!("expected a local save");
    };
    let temp_id = local.id.clone().unwrap();

    let (mut edit, check) = harness.engine.open_for_edit(&temp_id).await.unwrap();
    assert_eq!(check, ConflictCheck::Clean);
    edit.fields.name = "Central Park".into();
    let SaveOutcome::Local(edited) = harness
        .engine
        .save(edit.into_record(), false)
        .await
        .unwrap()
    else {
        panic!("expected a local save");
    };
    assert_eq!(edited.id, Some(temp_id));
    assert_eq!(edited.status, PendingStatus::PendingCreate);

    harness.set_online(true);
    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(harness.server.calls(), vec!["create".to_string()]);
    assert_eq!(harness.server.records()[0].name, "Central Park");
}

#[tokio::test]
async fn offline_delete_is_hidden_then_purged_on_drain() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-3", "Harbor", 1));
    harness.engine.fetch().await.unwrap();
    harness.set_online(false);
    let mut notices = harness.engine.subscribe_notices();

    let id = ObjectiveId::new("srv-3");
    let record = harness.stored(&id).unwrap();
    let outcome = harness.engine.delete(record, false).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Local);
    assert_eq!(harness.stored(&id).unwrap().status, PendingStatus::PendingDelete);
    assert!(matches!(notices.try_recv(), Ok(Notice::DeletedLocally(_))));

    let state = harness.engine.settled().await;
    assert_eq!(state.find(&id), None);

    harness.set_online(true);
    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(harness.server.record(&id), None);
    assert_eq!(harness.stored(&id), None);
}

#[tokio::test]
async fn deleting_a_queued_create_never_contacts_the_server() {
    let harness = Harness::new(false);
    let SaveOutcome::Local(local) = harness.engine.save(draft("Pier"), false).await.unwrap() else {
        panic!("expected a local save");
    };

    harness.set_online(true);
    let outcome = harness.engine.delete(local.clone(), true).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Discarded);
    assert_eq!(harness.stored(local.id.as_ref().unwrap()), None);

    harness.engine.drain().await.unwrap();
    assert_eq!(harness.server.call_count(), 0);
    assert!(harness.engine.settled().await.objectives.is_empty());
}

#[tokio::test]
async fn deleting_an_unsaved_objective_is_rejected() {
    let harness = Harness::new(true);
    let error = harness
        .engine
        .delete(draft("Nowhere"), true)
        .await
        .unwrap_err();
    assert!(matches!(error, waymark_core::Error::InvalidInput(_)));
}

#[tokio::test]
async fn tombstone_for_a_record_already_gone_is_purged() {
    let harness = Harness::new(true);
    let gone = server_objective("srv-77", "Ruins", 2).with_status(PendingStatus::PendingDelete);
    harness.store.put(&gone).unwrap();

    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(harness.stored(&ObjectiveId::new("srv-77")), None);
}

#[tokio::test]
async fn degraded_fetch_excludes_pending_updates() {
    let harness = Harness::new(false);
    let synced = server_objective("a", "Synced", 1);
    let updated = server_objective("b", "Updated", 2).with_status(PendingStatus::PendingUpdate);
    let deleted = server_objective("c", "Deleted", 1).with_status(PendingStatus::PendingDelete);
    for record in [&synced, &updated, &deleted] {
        harness.store.put(record).unwrap();
    }

    let objectives = harness.engine.fetch().await.unwrap();
    assert_eq!(objectives, vec![synced, deleted]);

    let state = harness.engine.settled().await;
    assert_eq!(state.objectives, objectives);
    assert!(!state.fetching);
    assert_eq!(state.fetch_error, None);
}

#[tokio::test]
async fn degraded_fetch_with_empty_store_reports_error() {
    let harness = Harness::new(false);

    let objectives = harness.engine.fetch().await.unwrap();
    assert!(objectives.is_empty());

    let state = harness.engine.settled().await;
    assert!(state.fetch_error.is_some());
}

#[tokio::test]
async fn fetch_persists_the_server_list() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-1", "One", 1));
    harness.server.insert(server_objective("srv-2", "Two", 4));

    let objectives = harness.engine.fetch().await.unwrap();
    assert_eq!(objectives.len(), 2);
    assert_eq!(harness.stored(&ObjectiveId::new("srv-2")).unwrap().version, 4);
    assert_eq!(harness.engine.settled().await.objectives, objectives);
}

#[tokio::test]
async fn fetch_without_credentials_does_nothing() {
    let harness = Harness::new(true);
    harness.engine.switch_session(Session::anonymous()).await;

    let objectives = harness.engine.fetch().await.unwrap();
    assert!(objectives.is_empty());
    assert_eq!(harness.server.call_count(), 0);
}

#[tokio::test]
async fn malformed_entries_are_skipped() {
    let harness = Harness::new(true);
    harness.store.raw().set("bad-json", "{not json").unwrap();
    harness
        .store
        .raw()
        .set(
            "bad-status",
            r#"{"_id":"bad-status","name":"x","userId":"u","version":1,"status":9}"#,
        )
        .unwrap();
    harness.engine.save(draft("Good"), false).await.unwrap();

    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.malformed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn conflict_is_surfaced_once_and_keep_local_wins() {
    let harness = Harness::new(true);
    let id = ObjectiveId::new("srv-5");
    harness.store.put(&server_objective("srv-5", "Old name", 4)).unwrap();
    harness.server.insert(server_objective("srv-5", "Server name", 5));
    let mut events = harness.engine.subscribe_events();

    let (mut edit, check) = harness.engine.open_for_edit(&id).await.unwrap();
    let ConflictCheck::Conflict(server) = check else {
        panic!("expected a conflict, got {check:?}");
    };
    assert_eq!(server.version, 5);

    let state = harness.engine.settled().await;
    assert_eq!(state.conflict.as_ref(), Some(&server));

    edit.fields.name = "My name".into();
    let outcome = harness
        .engine
        .resolve_conflict(edit, &server, Resolution::KeepLocal, true)
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Remote(_)));
    assert_eq!(outcome.objective().version, 6);

    let remote = harness.server.record(&id).unwrap();
    assert_eq!(remote.version, 6);
    assert_eq!(remote.name, "My name");

    let state = harness.engine.settled().await;
    assert_eq!(state.conflict, None);

    let mut detected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::ConflictDetected(_)) {
            detected += 1;
        }
    }
    assert_eq!(detected, 1);
}

#[tokio::test]
async fn accept_server_adopts_without_remote_write() {
    let harness = Harness::new(true);
    let id = ObjectiveId::new("srv-8");
    harness.store.put(&server_objective("srv-8", "Mine", 2)).unwrap();
    harness.server.insert(server_objective("srv-8", "Theirs", 3));

    let (edit, check) = harness.engine.open_for_edit(&id).await.unwrap();
    let ConflictCheck::Conflict(server) = check else {
        panic!("expected a conflict");
    };
    let calls = harness.server.call_count();

    let outcome = harness
        .engine
        .resolve_conflict(edit, &server, Resolution::AcceptServer, true)
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Adopted(server.clone()));
    assert_eq!(harness.server.call_count(), calls);
    assert_eq!(harness.stored(&id), Some(server));
    assert_eq!(harness.engine.settled().await.conflict, None);
}

#[tokio::test]
async fn matching_versions_are_clean() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-2", "Same", 7));

    let check = harness
        .engine
        .check_conflict(&ObjectiveId::new("srv-2"), 7)
        .await;
    assert_eq!(check, ConflictCheck::Clean);
    assert_eq!(harness.engine.settled().await.conflict, None);
}

#[tokio::test]
async fn new_records_skip_the_conflict_check() {
    let harness = Harness::new(true);
    let record = EditDraft::create(draft("Fresh")).into_record();
    assert_eq!(record.version, 1);

    let check = harness
        .engine
        .check_conflict(&ObjectiveId::temporary(), 1)
        .await;
    assert_eq!(check, ConflictCheck::Clean);
    assert_eq!(harness.server.call_count(), 0);
}

#[tokio::test]
async fn drain_failure_keeps_pending_status_and_continues() {
    let harness = Harness::new(true);
    for (id, name) in [("srv-a", "A"), ("srv-b", "B")] {
        harness.server.insert(server_objective(id, name, 1));
        let mut edited = server_objective(id, &format!("{name} edited"), 2);
        edited.status = PendingStatus::PendingUpdate;
        harness.store.put(&edited).unwrap();
    }
    harness.server.reject(&ObjectiveId::new("srv-a"));

    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(
        harness.stored(&ObjectiveId::new("srv-a")).unwrap().status,
        PendingStatus::PendingUpdate
    );
    assert_eq!(
        harness.stored(&ObjectiveId::new("srv-b")).unwrap().status,
        PendingStatus::Synced
    );
    assert_eq!(harness.engine.sync_state(), SyncState::Error);
}

fn queue_updates(harness: &Harness, ids: &[&str]) {
    for id in ids {
        harness.server.insert(server_objective(id, "Old", 1));
        let mut edited = server_objective(id, "New", 2);
        edited.status = PendingStatus::PendingUpdate;
        harness.store.put(&edited).unwrap();
    }
}

#[tokio::test]
async fn delete_during_drain_is_replayed_in_the_same_pass() {
    let harness = Harness::new(true);
    queue_updates(&harness, &["srv-a", "srv-b"]);
    let b = ObjectiveId::new("srv-b");

    let gate = harness.server.update_gate.lock().await;
    let engine = Arc::clone(&harness.engine);
    let drain = tokio::spawn(async move { engine.drain().await });
    harness.server.update_entered.notified().await;

    let outcome = harness
        .engine
        .delete(harness.stored(&b).unwrap(), false)
        .await
        .unwrap();
    assert_eq!(outcome, DeleteOutcome::Local);
    drop(gate);

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(harness.server.record(&b), None);
    assert_eq!(harness.stored(&b), None);
    assert_eq!(
        harness.server.calls(),
        vec!["update".to_string(), "delete".to_string()]
    );
}

#[tokio::test]
async fn delete_while_its_update_is_in_flight_survives_the_drain() {
    let harness = Harness::new(true);
    queue_updates(&harness, &["srv-a"]);
    let a = ObjectiveId::new("srv-a");

    let gate = harness.server.update_gate.lock().await;
    let engine = Arc::clone(&harness.engine);
    let drain = tokio::spawn(async move { engine.drain().await });
    harness.server.update_entered.notified().await;

    harness
        .engine
        .delete(harness.stored(&a).unwrap(), false)
        .await
        .unwrap();
    drop(gate);

    let report = drain.await.unwrap().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(
        harness.stored(&a).unwrap().status,
        PendingStatus::PendingDelete
    );
    assert_eq!(harness.server.record(&a).unwrap().version, 2);

    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(harness.server.record(&a), None);
    assert_eq!(harness.stored(&a), None);
}

#[tokio::test]
async fn edit_while_its_update_is_in_flight_is_kept_for_the_next_drain() {
    let harness = Harness::new(true);
    queue_updates(&harness, &["srv-a"]);
    let a = ObjectiveId::new("srv-a");

    let gate = harness.server.update_gate.lock().await;
    let engine = Arc::clone(&harness.engine);
    let drain = tokio::spawn(async move { engine.drain().await });
    harness.server.update_entered.notified().await;

    let (mut edit, check) = harness.engine.open_for_edit(&a).await.unwrap();
    assert_eq!(check, ConflictCheck::Clean);
    edit.fields.name = "Newest".into();
    harness.engine.save(edit.into_record(), false).await.unwrap();
    drop(gate);

    drain.await.unwrap().unwrap();
    let queued = harness.stored(&a).unwrap();
    assert_eq!(queued.name, "Newest");
    assert_eq!(queued.version, 3);
    assert_eq!(queued.status, PendingStatus::PendingUpdate);

    harness.engine.drain().await.unwrap();
    let server = harness.server.record(&a).unwrap();
    assert_eq!(server.name, "Newest");
    assert_eq!(server.version, 3);
    assert_eq!(harness.stored(&a).unwrap().status, PendingStatus::Synced);
}

#[tokio::test]
async fn failed_local_write_after_replayed_create_keeps_the_queued_create() {
    let writes = Arc::new(FailingWrites::default());
    let harness = Harness::with_store(false, ObjectiveStore::new(writes.clone()));
    let SaveOutcome::Local(local) = harness.engine.save(draft("Harbour"), false).await.unwrap()
    else {
        panic!("expected a local save");
    };
    let temp_id = local.id.clone().unwrap();

    harness.set_online(true);
    writes.set_failing(true);
    let report = harness.engine.drain().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.created, 0);

    let kept = harness.stored(&temp_id).unwrap();
    assert_eq!(kept.status, PendingStatus::PendingCreate);
    assert_eq!(harness.store.scan().unwrap().records, vec![kept]);
}

#[tokio::test]
async fn reopening_a_queued_update_online_is_not_a_conflict() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-4", "Tower", 1));
    harness.engine.fetch().await.unwrap();
    let id = ObjectiveId::new("srv-4");

    harness.set_online(false);
    let (mut edit, _) = harness.engine.open_for_edit(&id).await.unwrap();
    edit.fields.name = "Clock Tower".into();
    harness.engine.save(edit.into_record(), false).await.unwrap();
    assert_eq!(harness.stored(&id).unwrap().version, 2);

    harness.set_online(true);
    let (mut edit, check) = harness.engine.open_for_edit(&id).await.unwrap();
    assert_eq!(check, ConflictCheck::Clean);
    assert_eq!(harness.engine.settled().await.conflict, None);

    edit.fields.name = "Old Clock Tower".into();
    let outcome = harness.engine.save(edit.into_record(), true).await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Remote(_)), "got {outcome:?}");
    let server = harness.server.record(&id).unwrap();
    assert_eq!(server.version, 2);
    assert_eq!(server.name, "Old Clock Tower");
}

#[tokio::test]
async fn superseded_session_dispatches_nothing() {
    let harness = Harness::new(true);
    harness.server.insert(server_objective("srv-1", "Hidden", 1));

    let gate = harness.server.list_gate.lock().await;
    let engine = Arc::clone(&harness.engine);
    let fetch = tokio::spawn(async move { engine.fetch().await });
    harness.server.list_entered.notified().await;

    harness
        .engine
        .switch_session(Session::new("other-token", "user-2"))
        .await;
    drop(gate);

    let fetched = fetch.await.unwrap().unwrap();
    assert_eq!(fetched.len(), 1);

    let state = harness.engine.settled().await;
    assert!(state.objectives.is_empty());
    assert_eq!(harness.stored(&ObjectiveId::new("srv-1")), None);
}

#[tokio::test]
async fn shut_down_engine_leaves_state_untouched() {
    let harness = Harness::new(false);
    harness.engine.shutdown().await;

    harness.engine.save(draft("Late"), false).await.unwrap();
    assert!(harness.engine.settled().await.objectives.is_empty());
}

#[tokio::test]
async fn background_loop_drains_when_connectivity_returns() {
    let harness = Harness::new(false);
    harness.engine.save(draft("Queued"), false).await.unwrap();

    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(
        Arc::clone(&harness.engine).run(RunOptions::default(), shutdown.clone()),
    );

    harness.set_online(true);
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if harness.store.pending_counts().unwrap().pending() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queued record was not drained");

    assert_eq!(harness.server.records().len(), 1);
    shutdown.cancel();
    runner.await.unwrap();
}
