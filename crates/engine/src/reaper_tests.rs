// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::scheduler::Scheduler;
use crate::test_support::{harness, harness_with, item, Harness, HarnessConfig};
use cortex_core::{Clock, FailureCategory, HealthEventType};

/// Dispatch one item through the scheduler and return its dispatch row.
async fn dispatch_item(h: &Harness, id: &str, agent: &str) -> Dispatch {
    h.backlog.push_ready("alpha", item(id, agent, 1));
    let scheduler = Scheduler::new(Arc::clone(&h.ctx));
    let outcome = scheduler.tick().await.unwrap().unwrap();
    assert_eq!(outcome.dispatched, 1);
    h.backlog.remove_ready("alpha", id);
    h.store
        .list_running()
        .unwrap()
        .into_iter()
        .find(|d| d.work_item == id)
        .unwrap()
}

#[tokio::test]
async fn records_completed_dispatch() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;
    h.subprocess.set_status(d.handle, BackendStatus::Completed);

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.completed, 1);

    let row = h.store.get_dispatch(d.id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Completed);
    assert_eq!(row.exit_code, 0);
    assert!(row.completed_at_ms.unwrap() >= row.dispatched_at_ms);
}

#[tokio::test]
async fn records_failure_with_output_tail() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;
    h.subprocess
        .set_status(d.handle, BackendStatus::Failed { exit_code: 9 });
    h.subprocess
        .set_output(d.handle, b"stack trace: everything is on fire".to_vec());

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.failed, 1);

    let row = h.store.get_dispatch(d.id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Failed);
    assert_eq!(row.exit_code, 9);
    assert_eq!(row.failure_category, Some(FailureCategory::NonzeroExit));
    assert!(row.failure_summary.unwrap().contains("on fire"));
}

#[tokio::test]
async fn young_running_dispatch_is_left_alone() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome, ReapOutcome::default());
    assert!(h.store.get_dispatch(d.id).unwrap().unwrap().is_running());
    assert_eq!(h.subprocess.kill_count(), 0);
}

#[tokio::test]
async fn stuck_dispatch_is_killed_and_failed() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;

    // Backdate past the 45m stuck timeout
    let stuck_ms = h.ctx.settings.stuck_timeout.as_millis() as i64;
    h.store
        .set_dispatch_time(d.id, h.clock.now_ms() - stuck_ms - 60_000)
        .unwrap();

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.stuck, 1);
    assert_eq!(h.subprocess.kill_count(), 1);

    let row = h.store.get_dispatch(d.id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Failed);
    assert_eq!(row.failure_category, Some(FailureCategory::StuckDispatch));

    let events = h.store.recent_health_events(10).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == HealthEventType::StuckDispatch && e.dispatch_id == d.id));
}

#[tokio::test]
async fn stuck_then_retried_by_scheduler_with_bumped_retries() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;
    let stuck_ms = h.ctx.settings.stuck_timeout.as_millis() as i64;
    h.store
        .set_dispatch_time(d.id, h.clock.now_ms() - stuck_ms - 60_000)
        .unwrap();
    run_reaper_pass(&h.ctx).await.unwrap();

    // Item becomes eligible again once the backoff window passes
    h.backlog.push_ready("alpha", item("A", "coder", 1));
    h.clock.advance_secs(3700);
    let scheduler = Scheduler::new(Arc::clone(&h.ctx));
    assert_eq!(scheduler.tick().await.unwrap().unwrap().dispatched, 1);

    let retried = h
        .store
        .list_running()
        .unwrap()
        .into_iter()
        .find(|row| row.work_item == "A")
        .unwrap();
    assert_eq!(retried.retries, 1);
}

#[tokio::test]
async fn vanished_subprocess_is_unknown_exit_state() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;
    h.subprocess.set_status(d.handle, BackendStatus::Unknown);

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.vanished, 1);

    let row = h.store.get_dispatch(d.id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Failed);
    assert_eq!(row.failure_category, Some(FailureCategory::UnknownExitState));
    let events = h.store.recent_health_events(10).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == HealthEventType::UnknownExitState));
}

#[tokio::test]
async fn vanished_session_is_session_disappeared() {
    let h = harness();
    // Seed a session-backend dispatch directly; the session fake has never
    // heard of its handle.
    let now = h.clock.now_ms();
    let id = h
        .store
        .record_dispatch(&cortex_store::NewDispatch {
            work_item: "S".into(),
            project: "alpha".into(),
            agent: "coder".into(),
            provider: "sonnet".into(),
            tier: cortex_core::Tier::Balanced,
            backend: cortex_core::BackendKind::Session,
            handle: 777,
            session_name: Some("ctx-alpha-coder-1767225600".into()),
            work_dir: "/tmp/alpha".into(),
            log_path: "/tmp/alpha.log".into(),
            prompt: "p".into(),
            retries: 0,
            dispatched_at_ms: now,
        })
        .unwrap();

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.vanished, 1);

    let row = h.store.get_dispatch(id).unwrap().unwrap();
    assert_eq!(row.failure_category, Some(FailureCategory::SessionDisappeared));
}

#[tokio::test]
async fn retry_exhaustion_surfaces_health_event() {
    let mut config = HarnessConfig::default();
    config.policy.max_retries = 1;
    let h = harness_with(config);
    let d = dispatch_item(&h, "A", "coder").await;
    h.subprocess
        .set_status(d.handle, BackendStatus::Failed { exit_code: 1 });

    run_reaper_pass(&h.ctx).await.unwrap();

    let events = h.store.recent_health_events(10).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == HealthEventType::BeadChurnBlocked && e.dispatch_id == d.id));
}

#[tokio::test]
async fn unknown_row_from_restart_is_categorized() {
    let h = harness();
    let d = dispatch_item(&h, "A", "coder").await;
    h.store.mark_unknown(d.id).unwrap();
    h.subprocess.set_status(d.handle, BackendStatus::Unknown);

    run_reaper_pass(&h.ctx).await.unwrap();

    let row = h.store.get_dispatch(d.id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Failed);
    assert_eq!(row.failure_category, Some(FailureCategory::UnknownExitState));
}
