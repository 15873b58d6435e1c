// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stuck-dispatch recovery: reaper failure, health event, scheduled retry.

use crate::prelude::*;
use cortex_core::{DispatchState, FailureCategory, HealthEventType};
use cortex_engine::run_reaper_pass;

#[tokio::test]
async fn stuck_dispatch_fails_and_retries_with_bumped_count() {
    let mut config = HarnessConfig::default();
    config.settings.stuck_timeout = std::time::Duration::from_secs(45 * 60);
    let h = harness_with(config);

    h.backlog.push_ready("alpha", item("A", "coder", 1));
    assert_eq!(scheduler(&h).tick().await.unwrap().unwrap().dispatched, 1);

    let d = &h.store.list_running().unwrap()[0];
    let id = d.id;

    // dispatched_at = now - 46m with stuck_timeout = 45m
    h.store
        .set_dispatch_time(id, h.clock.now_ms() - 46 * 60 * 1000)
        .unwrap();

    let outcome = run_reaper_pass(&h.ctx).await.unwrap();
    assert_eq!(outcome.stuck, 1);

    let row = h.store.get_dispatch(id).unwrap().unwrap();
    assert_eq!(row.state, DispatchState::Failed);
    assert_eq!(row.failure_category, Some(FailureCategory::StuckDispatch));

    let events = h.store.recent_health_events(10).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == HealthEventType::StuckDispatch && e.dispatch_id == id));

    // Once the backoff window passes, the scheduler re-dispatches with
    // retries = 1
    h.clock.advance_secs(3700);
    assert_eq!(scheduler(&h).tick().await.unwrap().unwrap().dispatched, 1);

    let retried = &h.store.list_running().unwrap()[0];
    assert_eq!(retried.work_item, "A");
    assert_eq!(retried.retries, 1);
    assert_ne!(retried.id, id);

    // The failed row is untouched history
    let original = h.store.get_dispatch(id).unwrap().unwrap();
    assert_eq!(original.state, DispatchState::Failed);
}

#[tokio::test]
async fn reaper_pass_on_healthy_dispatches_changes_nothing() {
    let h = harness();
    h.backlog.push_ready("alpha", item("A", "coder", 1));
    scheduler(&h).tick().await.unwrap().unwrap();

    let before = h.store.list_running().unwrap();
    run_reaper_pass(&h.ctx).await.unwrap();
    let after = h.store.list_running().unwrap();

    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].id, after[0].id);
    assert_eq!(after[0].state, DispatchState::Running);
}
