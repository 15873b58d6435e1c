// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backlog collaborator interface.
//!
//! The backlog service owns work items and their dependency graphs; the
//! scheduler only ever sees items that are ready to run. The core makes no
//! assumptions beyond this trait.

mod beads;

pub use beads::BeadsBacklog;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBacklog;

use async_trait::async_trait;
use cortex_core::{ItemType, WorkItem};
use thiserror::Error;

/// Errors from backlog operations
#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("backlog command failed: {0}")]
    CommandFailed(String),
    #[error("cannot parse backlog output: {0}")]
    Parse(String),
}

/// Inbound interface to the backlog service.
#[async_trait]
pub trait Backlog: Send + Sync {
    /// Ready work items for a project: dependency-filtered, unblocked, and
    /// with epics excluded.
    async fn list_ready(&self, project: &str) -> Result<Vec<WorkItem>, BacklogError>;

    async fn update_priority(
        &self,
        project: &str,
        id: &str,
        priority: u32,
    ) -> Result<(), BacklogError>;

    /// Create a new work item, returning its id.
    async fn create(
        &self,
        project: &str,
        title: &str,
        item_type: ItemType,
        priority: u32,
        description: &str,
    ) -> Result<String, BacklogError>;
}
