// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tick behavior: happy path, rate limits, agent serialization.

use crate::prelude::*;
use cortex_core::DispatchState;

#[tokio::test]
async fn two_ready_items_dispatch_through_unauthed_fast_tier() {
    let h = harness_with_unauthed_fast();
    h.backlog.push_ready("alpha", item("A", "coder", 1));
    h.backlog.push_ready("alpha", item("B", "reviewer", 2));

    let outcome = scheduler(&h).tick().await.unwrap().unwrap();

    assert_eq!(outcome.dispatched, 2);
    assert_eq!(outcome.failed, 0);

    let running = h.store.list_running().unwrap();
    assert_eq!(running.len(), 2);
    assert_ne!(running[0].handle, running[1].handle);
    assert!(running.iter().all(|d| d.state == DispatchState::Running));
    assert!(running.iter().all(|d| d.provider == "X"));
    // Unauthed: the rate-limit windows stay untouched
    assert_eq!(h.store.count_authed_usage_5h(h.clock.now_ms()).unwrap(), 0);
}

#[tokio::test]
async fn exhausted_short_window_blocks_authed_dispatch() {
    let h = harness_with_authed_balanced(3);

    // Pre-seed three usage rows inside the 5h window
    let now = h.clock.now_ms();
    for i in 0..3 {
        h.store
            .record_provider_usage("claude", "coder", &format!("seed-{}", i), now - 60_000)
            .unwrap();
    }
    h.backlog.push_ready("alpha", item("A", "coder", 1));

    let outcome = scheduler(&h).tick().await.unwrap().unwrap();

    assert_eq!(outcome.dispatched, 0);
    assert_eq!(outcome.rate_limited, 1);
    assert!(h.store.list_running().unwrap().is_empty());
    assert_eq!(h.subprocess.dispatched_count(), 0);
    // No new usage row appeared
    assert_eq!(h.store.count_authed_usage_5h(now).unwrap(), 3);
}

#[tokio::test]
async fn rate_limit_clears_as_the_window_rolls() {
    let h = harness_with_authed_balanced(3);
    let now = h.clock.now_ms();
    for i in 0..3 {
        h.store
            .record_provider_usage("claude", "coder", &format!("seed-{}", i), now - 60_000)
            .unwrap();
    }
    h.backlog.push_ready("alpha", item("A", "coder", 1));

    assert_eq!(scheduler(&h).tick().await.unwrap().unwrap().rate_limited, 1);

    // Five hours later the seeds roll out of the short window
    h.clock.advance_ms(cortex_store::WINDOW_5H_MS);
    let outcome = scheduler(&h).tick().await.unwrap().unwrap();
    assert_eq!(outcome.dispatched, 1);
}

#[tokio::test]
async fn busy_agent_blocks_further_items() {
    let h = harness_with_unauthed_fast();

    // A0 running under agent coder
    h.backlog.push_ready("alpha", item("A0", "coder", 0));
    assert_eq!(scheduler(&h).tick().await.unwrap().unwrap().dispatched, 1);
    h.backlog.remove_ready("alpha", "A0");

    // A1 and A2 share the busy agent
    h.backlog.push_ready("alpha", item("A1", "coder", 1));
    h.backlog.push_ready("alpha", item("A2", "coder", 2));
    h.clock.advance_secs(120);

    let outcome = scheduler(&h).tick().await.unwrap().unwrap();
    assert_eq!(outcome.dispatched, 0);
    assert_eq!(h.store.list_running().unwrap().len(), 1);
}
