// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

pub use cortex_engine::test_support::{harness, harness_with, item, Harness, HarnessConfig};
pub use cortex_core::Clock;

use cortex_core::Tier;
use cortex_engine::Scheduler;
use std::collections::HashMap;
use std::sync::Arc;

/// Spec polling parameters: 50ms interval, 5s deadline.
pub const SPEC_POLL_INTERVAL_MS: u64 = 50;
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

/// A harness whose `fast` tier has exactly one unauthed provider `X`.
pub fn harness_with_unauthed_fast() -> Harness {
    let mut config = HarnessConfig::default();
    config.providers.clear();
    config.providers.insert(
        "X".to_string(),
        cortex_core::ProviderConfig {
            model: "x-1".into(),
            tier: Tier::Fast,
            authed: false,
        },
    );
    config.tiers = cortex_engine::TierMap {
        fast: vec!["X".to_string()],
        balanced: vec!["X".to_string()],
        premium: vec!["X".to_string()],
    };
    config.settings.default_tier = Tier::Fast;
    config.settings.max_per_tick = 5;
    harness_with(config)
}

/// A harness whose `balanced` tier has exactly one authed provider.
pub fn harness_with_authed_balanced(window_5h_cap: u32) -> Harness {
    let mut config = HarnessConfig::default();
    config.providers = HashMap::new();
    config.providers.insert(
        "claude".to_string(),
        cortex_core::ProviderConfig {
            model: "sonnet-4".into(),
            tier: Tier::Balanced,
            authed: true,
        },
    );
    config.tiers = cortex_engine::TierMap {
        fast: vec![],
        balanced: vec!["claude".to_string()],
        premium: vec![],
    };
    config.limits.window_5h_cap = window_5h_cap;
    harness_with(config)
}

pub fn scheduler(h: &Harness) -> Scheduler {
    Scheduler::new(Arc::clone(&h.ctx))
}
