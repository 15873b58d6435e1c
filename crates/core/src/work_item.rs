// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backlog work items (beads)

use serde::{Deserialize, Serialize};

/// Kind of backlog item. Epics group other items and are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Task,
    Bug,
    Feature,
    Chore,
    Epic,
}

impl ItemType {
    pub fn is_epic(&self) -> bool {
        matches!(self, ItemType::Epic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Task => "task",
            ItemType::Bug => "bug",
            ItemType::Feature => "feature",
            ItemType::Chore => "chore",
            ItemType::Epic => "epic",
        }
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(ItemType::Task),
            "bug" => Ok(ItemType::Bug),
            "feature" => Ok(ItemType::Feature),
            "chore" => Ok(ItemType::Chore),
            "epic" => Ok(ItemType::Epic),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// A single unit of backlog work, as supplied by the backlog collaborator.
///
/// Items arriving through `Backlog::list_ready` are already
/// dependency-filtered; `depends_on` is carried for display and auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Lower value is more urgent (0 = highest priority).
    pub priority: u32,
    /// Agent responsible for this item.
    pub agent: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub title: String,
    #[serde(default)]
    pub created_at_ms: i64,
}

impl WorkItem {
    /// Global selection key: `(project_priority, item_priority, created_at)`.
    ///
    /// Sorting candidate items by this tuple yields the stable cross-project
    /// dispatch order the scheduler truncates to `max_per_tick`.
    pub fn order_key(&self, project_priority: u32) -> (u32, u32, i64) {
        (project_priority, self.priority, self.created_at_ms)
    }
}

#[cfg(test)]
#[path = "work_item_tests.rs"]
mod tests;
