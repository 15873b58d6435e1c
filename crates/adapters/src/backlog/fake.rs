// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backlog for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Backlog, BacklogError};
use async_trait::async_trait;
use cortex_core::{ItemType, WorkItem};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct FakeBacklogState {
    ready: HashMap<String, Vec<WorkItem>>,
    failing: HashSet<String>,
    priority_updates: Vec<(String, String, u32)>,
    next_id: u64,
}

/// In-memory backlog with scriptable ready lists.
#[derive(Clone)]
pub struct FakeBacklog {
    inner: Arc<Mutex<FakeBacklogState>>,
}

impl Default for FakeBacklog {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeBacklogState {
                ready: HashMap::new(),
                failing: HashSet::new(),
                priority_updates: Vec::new(),
                next_id: 1,
            })),
        }
    }
}

impl FakeBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ready item for a project
    pub fn push_ready(&self, project: &str, item: WorkItem) {
        self.inner
            .lock()
            .ready
            .entry(project.to_string())
            .or_default()
            .push(item);
    }

    /// Remove an item from the ready list (it was dispatched or closed)
    pub fn remove_ready(&self, project: &str, id: &str) {
        if let Some(items) = self.inner.lock().ready.get_mut(project) {
            items.retain(|i| i.id != id);
        }
    }

    /// Make `list_ready` fail for one project
    pub fn fail_project(&self, project: &str) {
        self.inner.lock().failing.insert(project.to_string());
    }

    pub fn priority_updates(&self) -> Vec<(String, String, u32)> {
        self.inner.lock().priority_updates.clone()
    }
}

#[async_trait]
impl Backlog for FakeBacklog {
    async fn list_ready(&self, project: &str) -> Result<Vec<WorkItem>, BacklogError> {
        let inner = self.inner.lock();
        if inner.failing.contains(project) {
            return Err(BacklogError::CommandFailed(format!(
                "scripted failure for {}",
                project
            )));
        }
        Ok(inner.ready.get(project).cloned().unwrap_or_default())
    }

    async fn update_priority(
        &self,
        project: &str,
        id: &str,
        priority: u32,
    ) -> Result<(), BacklogError> {
        self.inner
            .lock()
            .priority_updates
            .push((project.to_string(), id.to_string(), priority));
        Ok(())
    }

    async fn create(
        &self,
        project: &str,
        title: &str,
        item_type: ItemType,
        priority: u32,
        _description: &str,
    ) -> Result<String, BacklogError> {
        let mut inner = self.inner.lock();
        let id = format!("fake-{}", inner.next_id);
        inner.next_id += 1;
        let item = WorkItem {
            id: id.clone(),
            item_type,
            priority,
            agent: String::new(),
            depends_on: vec![],
            title: title.to_string(),
            created_at_ms: 0,
        };
        inner.ready.entry(project.to_string()).or_default().push(item);
        Ok(id)
    }
}
