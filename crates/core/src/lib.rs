// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cortex-core: Domain types for the Cortex dispatch daemon

pub mod backoff;
pub mod clock;
pub mod dispatch;
pub mod duration;
pub mod health;
pub mod provider;
pub mod tier;
pub mod work_item;

pub use backoff::{RetryDecision, RetryPolicy};
pub use clock::{Clock, SystemClock};
pub use dispatch::{BackendKind, Dispatch, DispatchState, FailureCategory};
pub use duration::{format_elapsed, parse_duration};
pub use health::{HealthEvent, HealthEventType, SchedulerRunState};
pub use provider::{CliConfig, PromptMode, ProviderConfig};
pub use tier::Tier;
pub use work_item::{ItemType, WorkItem};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
