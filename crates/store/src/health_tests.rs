// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Store;
use cortex_core::{HealthEventType, SchedulerRunState};

#[test]
fn append_and_read_newest_first() {
    let store = Store::open_in_memory().unwrap();
    store
        .append_health_event(HealthEventType::StuckDispatch, 7, "dispatch 7 stuck", 1_000)
        .unwrap();
    store
        .append_health_event(HealthEventType::GatewayCritical, 0, "builder rejected flags", 2_000)
        .unwrap();

    let events = store.recent_health_events(10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, HealthEventType::GatewayCritical);
    assert_eq!(events[0].dispatch_id, 0);
    assert_eq!(events[1].event_type, HealthEventType::StuckDispatch);
    assert_eq!(events[1].dispatch_id, 7);
}

#[test]
fn limit_bounds_result() {
    let store = Store::open_in_memory().unwrap();
    for i in 0..5 {
        store
            .append_health_event(HealthEventType::DispatchFailed, i, "spawn failed", i * 100)
            .unwrap();
    }
    assert_eq!(store.recent_health_events(3).unwrap().len(), 3);
}

#[test]
fn scheduler_state_round_trips() {
    let store = Store::open_in_memory().unwrap();

    store
        .set_scheduler_state(SchedulerRunState::Paused, 5_000)
        .unwrap();
    let (state, at) = store.get_scheduler_state().unwrap();
    assert_eq!(state, SchedulerRunState::Paused);
    assert_eq!(at, 5_000);

    // Idempotent re-set refreshes the timestamp
    store
        .set_scheduler_state(SchedulerRunState::Paused, 6_000)
        .unwrap();
    let (state, at) = store.get_scheduler_state().unwrap();
    assert_eq!(state, SchedulerRunState::Paused);
    assert_eq!(at, 6_000);

    store
        .set_scheduler_state(SchedulerRunState::Running, 7_000)
        .unwrap();
    let (state, _) = store.get_scheduler_state().unwrap();
    assert_eq!(state, SchedulerRunState::Running);
}
