// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the dispatch control plane

use crate::ratelimit::RateWindow;
use cortex_adapters::{BackendError, BacklogError};
use cortex_store::StoreError;
use thiserror::Error;

/// Errors the dispatch pipeline surfaces.
///
/// Errors inside a single work item never abort a tick, and errors reading
/// one project's backlog never prevent other projects from being processed;
/// only [`DispatchError::Store`] aborts the tick and, if persistent, the
/// daemon.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rate limited: {window} window at {count}/{cap}")]
    RateLimited {
        window: RateWindow,
        count: u32,
        cap: u32,
    },
    #[error("no provider available after exclusions and tier downgrade")]
    NoProviderAvailable,
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Backlog(#[from] BacklogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
