mod common;

use std::time::Duration;

use common::{advance, mount, mount_with, single_node_scene, site_scene, wall, RecordingRepository, DEBOUNCE};
use scene_sync::autosave::{ActivationOutcome, AutosavePhaseKind, LifecycleState};
use scene_sync::errors::RepositoryError;
use scene_sync::scene::{Node, NodeId, NodeKind};
use scene_sync::view_state::EditorPhase;
use scene_sync::{AutosaveConfig, ProjectId};

const SECOND: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn test_loaded_scene_is_not_saved() {
    let harness = mount(RecordingRepository::new().with_model("p1", single_node_scene("a")));
    harness.open("p1").await;

    assert_eq!(harness.store.snapshot().len(), 1);
    advance(DEBOUNCE * 3).await;

    assert_eq!(harness.repository.attempt_count(), 0);
    let status = harness.handle.status();
    assert!(!status.dirty);
    assert_eq!(status.autosave, Some(AutosavePhaseKind::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_edit_is_saved_after_debounce() {
    let harness = mount(RecordingRepository::new().with_model("p1", single_node_scene("a")));
    harness.open("p1").await;

    let a = NodeId::from("a");
    harness.store.insert_node(wall("b"), Some(&a)).unwrap();

    advance(DEBOUNCE - SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 0);
    assert!(harness.handle.status().dirty);

    advance(2 * SECOND).await;
    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 1);

    let (project, saved) = &attempts[0];
    assert_eq!(project, &ProjectId::from("p1"));
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.get(&a).unwrap().children, vec![NodeId::from("b")]);
    assert_eq!(saved.root_node_ids, vec![a]);

    let status = harness.handle.wait_for_status(|status| !status.dirty).await.unwrap();
    assert_eq!(status.successful_saves, 1);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_saves_latest_state_once() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(4 * SECOND).await;
    harness.store.insert_node(wall("w2"), None).unwrap();
    advance(4 * SECOND).await;
    harness
        .store
        .update_node(&"w1".into(), |node| node.name = Some("North wall".to_string()))
        .unwrap();

    // The last edit restarted the timer: nothing at 10s after the first one.
    advance(4 * SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 0);

    advance(DEBOUNCE).await;
    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 1);
    let saved = &attempts[0].1;
    assert_eq!(saved.len(), 2);
    assert_eq!(
        saved.get(&"w1".into()).unwrap().name.as_deref(),
        Some("North wall")
    );
}

#[tokio::test(start_paused = true)]
async fn test_root_reorder_is_saved() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;

    harness.store.insert_node(Node::new("a", NodeKind::Site), None).unwrap();
    harness.store.insert_node(Node::new("b", NodeKind::Site), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.store.move_node(&"b".into(), None, Some(0)).unwrap();
    advance(DEBOUNCE + SECOND).await;

    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(
        attempts[1].1.root_node_ids,
        vec![NodeId::from("b"), NodeId::from("a")]
    );
    assert_eq!(
        harness.repository.stored("p1").unwrap().root_node_ids,
        harness.store.snapshot().root_node_ids
    );
}

#[tokio::test(start_paused = true)]
async fn test_notifications_without_tree_changes_are_ignored() {
    let harness = mount(RecordingRepository::new().with_model("p1", site_scene()));
    harness.open("p1").await;

    harness.store.touch();
    harness.store.update_node(&"b1".into(), |_| {}).unwrap();
    harness.store.touch();

    advance(DEBOUNCE * 2).await;
    assert_eq!(harness.repository.attempt_count(), 0);
    assert!(!harness.handle.status().dirty);
}

#[tokio::test(start_paused = true)]
async fn test_edits_during_save_produce_one_follow_up() {
    let harness = mount(RecordingRepository::gated());
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.store.insert_node(wall("w2"), None).unwrap();
    harness.store.insert_node(wall("w3"), None).unwrap();
    advance(DEBOUNCE * 3).await;

    // Still only the first save, now with a follow-up queued behind it.
    assert_eq!(harness.repository.attempt_count(), 1);
    assert_eq!(
        harness.handle.status().autosave,
        Some(AutosavePhaseKind::PendingQueued)
    );

    harness.repository.release(1);
    harness.repository.wait_for_finished(1).await;
    advance(DEBOUNCE + SECOND).await;

    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].1.len(), 3);

    harness.repository.release(1);
    harness.repository.wait_for_finished(2).await;
    advance(DEBOUNCE * 3).await;

    assert_eq!(harness.repository.attempt_count(), 2);
    assert_eq!(harness.repository.max_concurrent_saves(), 1);
    let status = harness.handle.status();
    assert!(!status.dirty);
    assert_eq!(status.autosave, Some(AutosavePhaseKind::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_edits_while_loading_are_discarded() {
    let repository = RecordingRepository::new()
        .with_model("p1", site_scene())
        .with_load_delay(5 * SECOND);
    let harness = mount(repository);

    let activation = harness.handle.activate("p1").await.unwrap();
    assert_eq!(activation.outcome, ActivationOutcome::Loading("p1".into()));
    assert_eq!(
        harness.handle.status().lifecycle,
        LifecycleState::Loading("p1".into())
    );

    harness.store.insert_node(wall("stray"), None).unwrap();
    harness.handle.wait_until_settled().await.unwrap();

    assert_eq!(*harness.store.snapshot(), site_scene());
    advance(DEBOUNCE * 3).await;
    assert_eq!(harness.repository.attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_load_resets_view_state() {
    let harness = mount(RecordingRepository::new().with_model("p1", site_scene()));
    harness.open("p1").await;

    let view = harness.view.current();
    assert_eq!(view.phase, EditorPhase::Structure);
    assert_eq!(view.selection.building_id, Some("b1".into()));
    assert_eq!(view.selection.level_id, Some("l1".into()));

    // No saved scene: empty selection, site phase.
    harness.handle.activate("fresh").await.unwrap();
    harness.handle.wait_until_settled().await.unwrap();
    let view = harness.view.current();
    assert_eq!(view.phase, EditorPhase::Site);
    assert_eq!(view.selection.building_id, None);
    assert!(harness.store.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_page_unload_flushes_unsaved_edits() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;

    let clean = harness.handle.page_unload().await.unwrap();
    assert!(!clean.is_dispatched());

    harness.store.insert_node(wall("w1"), None).unwrap();
    // Let the actor observe the edit.
    advance(SECOND).await;

    let dispatch = harness.handle.page_unload().await.unwrap();
    assert!(dispatch.is_dispatched());
    assert!(dispatch.completion().await);

    assert_eq!(harness.repository.attempt_count(), 1);
    assert!(harness.repository.stored("p1").unwrap().contains(&"w1".into()));
    harness
        .handle
        .wait_for_status(|status| !status.dirty)
        .await
        .unwrap();

    // The pending debounce was cancelled by the flush.
    advance(DEBOUNCE * 2).await;
    assert_eq!(harness.repository.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unload_right_after_edit_flushes_it() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;

    for i in 0..5 {
        let id = format!("w{}", i);
        harness.store.insert_node(wall(&id), None).unwrap();

        let dispatch = harness.handle.page_unload().await.unwrap();
        assert!(dispatch.is_dispatched(), "edit {} was not flushed", id);
        assert!(dispatch.completion().await);
        assert!(harness.repository.stored("p1").unwrap().contains(&id.into()));
    }
    assert_eq!(harness.repository.attempt_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_switch_right_after_edit_flushes_outgoing_project() {
    let repository = RecordingRepository::new()
        .with_model("p1", single_node_scene("a"))
        .with_model("p2", site_scene());
    let harness = mount(repository);
    harness.open("p1").await;

    harness
        .store
        .insert_node(wall("b"), Some(&"a".into()))
        .unwrap();
    let activation = harness.handle.activate("p2").await.unwrap();
    assert!(activation.flush.is_dispatched());
    assert!(activation.flush.completion().await);

    assert!(harness.repository.stored("p1").unwrap().contains(&"b".into()));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_flush_counts_as_failed() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;
    harness.store.insert_node(wall("w1"), None).unwrap();

    harness.repository.panic_next();
    let dispatch = harness.handle.page_unload().await.unwrap();
    assert!(!dispatch.completion().await);

    let status = harness
        .handle
        .wait_for_status(|status| status.failed_saves == 1)
        .await
        .unwrap();
    assert!(status.dirty);
    assert_eq!(status.in_flight_saves, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_is_swallowed() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;
    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(SECOND).await;

    harness
        .repository
        .fail_next(RepositoryError::Transient("connection reset".to_string()));
    let dispatch = harness.handle.page_unload().await.unwrap();
    assert!(!dispatch.completion().await);

    let status = harness
        .handle
        .wait_for_status(|status| status.failed_saves == 1)
        .await
        .unwrap();
    assert!(status.dirty);
}

#[tokio::test(start_paused = true)]
async fn test_flush_gives_up_after_timeout() {
    let config = AutosaveConfig {
        flush_timeout_ms: 2_000,
        ..Default::default()
    };
    let harness = mount_with(RecordingRepository::gated(), config);
    harness.open("p1").await;
    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(SECOND).await;

    let dispatch = harness.handle.page_unload().await.unwrap();
    assert!(!dispatch.completion().await);
    assert_eq!(harness.repository.attempt_count(), 1);
    assert!(harness.repository.stored("p1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_project_switch_flushes_and_loads_next() {
    let repository = RecordingRepository::new()
        .with_model("p1", single_node_scene("a"))
        .with_model("p2", site_scene());
    let harness = mount(repository);
    harness.open("p1").await;

    harness
        .store
        .insert_node(wall("b"), Some(&"a".into()))
        .unwrap();
    advance(SECOND).await;

    let activation = harness.handle.activate("p2").await.unwrap();
    assert_eq!(activation.outcome, ActivationOutcome::Loading("p2".into()));
    assert!(activation.flush.completion().await);

    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].0, ProjectId::from("p1"));
    assert!(attempts[0].1.contains(&"b".into()));

    harness.handle.wait_until_settled().await.unwrap();
    assert_eq!(*harness.store.snapshot(), site_scene());
    assert_eq!(
        harness.repository.loads(),
        vec![ProjectId::from("p1"), ProjectId::from("p2")]
    );

    advance(DEBOUNCE * 3).await;
    assert_eq!(harness.repository.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reactivating_same_project_does_not_reload() {
    let harness = mount(RecordingRepository::new().with_model("p1", site_scene()));
    harness.open("p1").await;

    let again = harness.handle.activate("p1").await.unwrap();
    assert_eq!(again.outcome, ActivationOutcome::Unchanged);
    assert!(!again.flush.is_dispatched());
    assert_eq!(harness.repository.loads().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_flushes_and_clears_store() {
    let harness = mount(RecordingRepository::new().with_model("p1", site_scene()));
    harness.open("p1").await;
    harness.store.insert_node(wall("w1"), Some(&"l1".into())).unwrap();
    advance(SECOND).await;

    let activation = harness.handle.deactivate().await.unwrap();
    assert_eq!(activation.outcome, ActivationOutcome::Deactivated);
    assert!(activation.flush.completion().await);

    assert!(harness.store.snapshot().is_empty());
    assert!(harness.repository.stored("p1").unwrap().contains(&"w1".into()));
    assert_eq!(harness.handle.status().lifecycle, LifecycleState::Inactive);

    advance(DEBOUNCE * 2).await;
    assert_eq!(harness.repository.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retry_until_limit() {
    let config = AutosaveConfig {
        max_retries: 2,
        ..Default::default()
    };
    let repository = RecordingRepository::new();
    for _ in 0..5 {
        repository.fail_next(RepositoryError::Transient("503".to_string()));
    }
    let harness = mount_with(repository, config);
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE * 12).await;

    assert_eq!(harness.repository.attempt_count(), 3);
    let status = harness.handle.status();
    assert!(status.dirty);
    assert_eq!(status.failed_saves, 3);
    assert_eq!(status.autosave, Some(AutosavePhaseKind::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_failure_is_not_retried() {
    let repository = RecordingRepository::new();
    repository.fail_next(RepositoryError::Unauthorized("not the owner".to_string()));
    let harness = mount(repository);
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE * 6).await;
    assert_eq!(harness.repository.attempt_count(), 1);
    assert!(harness.handle.status().dirty);

    // The next edit tries again.
    harness.store.insert_node(wall("w2"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 2);
    assert!(!harness.handle.status().dirty);
}

#[tokio::test(start_paused = true)]
async fn test_late_save_of_abandoned_project_is_ignored() {
    let repository = RecordingRepository::gated()
        .with_model("p1", single_node_scene("a"))
        .with_model("p2", site_scene());
    let harness = mount(repository);
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 1);

    // The switch flush of p1 is held until the running save returns.
    harness.handle.activate("p2").await.unwrap();
    harness.handle.wait_until_settled().await.unwrap();
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.repository.release(2);
    harness.repository.wait_for_finished(2).await;
    let status = harness
        .handle
        .wait_for_status(|status| status.in_flight_saves == 0)
        .await
        .unwrap();

    assert_eq!(status.active_project(), Some(&ProjectId::from("p2")));
    assert!(!status.dirty);
    assert_eq!(status.autosave, Some(AutosavePhaseKind::Idle));
    assert_eq!(*harness.store.snapshot(), site_scene());
    assert_eq!(harness.repository.max_concurrent_saves(), 1);

    advance(DEBOUNCE * 3).await;
    assert_eq!(harness.repository.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_switch_flush_waits_for_running_save_of_same_project() {
    let repository = RecordingRepository::gated()
        .with_model("p1", single_node_scene("a"))
        .with_model("p2", site_scene());
    let harness = mount(repository);
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.store.insert_node(wall("w2"), None).unwrap();
    let activation = harness.handle.activate("p2").await.unwrap();
    assert!(activation.flush.is_dispatched());
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.repository.release(2);
    assert!(activation.flush.completion().await);

    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].1.contains(&"w2".into()));
    assert!(attempts[1].1.contains(&"w2".into()));
    assert_eq!(harness.repository.max_concurrent_saves(), 1);

    let stored = harness.repository.stored("p1").unwrap();
    assert!(stored.contains(&"w1".into()));
    assert!(stored.contains(&"w2".into()));
}

#[tokio::test(start_paused = true)]
async fn test_returning_project_waits_for_its_earlier_save() {
    let repository = RecordingRepository::gated().with_model("p1", single_node_scene("a"));
    let harness = mount(repository);
    harness.open("p1").await;

    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;
    assert_eq!(harness.repository.attempt_count(), 1);

    harness.handle.activate("p2").await.unwrap();
    harness.handle.wait_until_settled().await.unwrap();
    harness.open("p1").await;

    harness.store.insert_node(wall("w2"), None).unwrap();
    advance(DEBOUNCE + SECOND).await;

    // Both the switch flush (timed out by now) and the scheduled save were
    // held behind the first activation's save.
    assert_eq!(harness.repository.attempt_count(), 1);
    assert_eq!(
        harness.handle.status().autosave,
        Some(AutosavePhaseKind::PendingQueued)
    );

    harness.repository.release(2);
    harness.repository.wait_for_finished(1).await;
    advance(DEBOUNCE + SECOND).await;
    harness.repository.wait_for_finished(2).await;

    let attempts = harness.repository.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1].1.contains(&"w2".into()));
    assert!(harness.repository.stored("p1").unwrap().contains(&"w2".into()));
    assert_eq!(harness.repository.max_concurrent_saves(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_flushes_and_stops() {
    let harness = mount(RecordingRepository::new());
    harness.open("p1").await;
    harness.store.insert_node(wall("w1"), None).unwrap();
    advance(SECOND).await;

    let other = harness.handle.clone();
    let dispatch = harness.handle.unmount().await.unwrap();
    assert!(dispatch.completion().await);
    assert!(harness.repository.stored("p1").unwrap().contains(&"w1".into()));

    assert!(other.page_unload().await.is_err());
}
