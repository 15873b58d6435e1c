// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cortexd: the Cortex dispatch daemon.
//!
//! Long-running process that ticks the scheduler, runs the reaper, and
//! serves the local HTTP control surface.

pub mod config;
pub mod http;
pub mod lifecycle;

pub use config::{Config, ConfigError};
pub use lifecycle::{graceful_shutdown, startup, Daemon, LifecycleError};
