// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cortex-engine: the dispatch control plane.
//!
//! Ties the store, rate limiter, and backends together: the scheduler turns
//! backlog state into bounded concurrent dispatches, the reaper drives every
//! dispatch to a terminal state, and the control module exposes the
//! operations behind the HTTP surface.

pub mod control;
pub mod ctx;
pub mod error;
pub mod ratelimit;
pub mod reaper;
pub mod scheduler;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use control::{Control, ControlError};
pub use ctx::{BackendRouter, DispatchCtx, ProjectEntry, SchedulerSettings, TierMap};
pub use error::DispatchError;
pub use ratelimit::{RateLimiter, RateLimits, RateWindow, Reservation};
pub use reaper::{run_reaper_pass, ReapOutcome};
pub use scheduler::{Scheduler, TickOutcome};
