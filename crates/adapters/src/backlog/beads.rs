// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Beads CLI backlog adapter.
//!
//! Shells out to the `bd` issue tracker in each project's beads directory.
//! Work items cross the boundary as JSON; this adapter never parses the
//! human-readable output.

use super::{Backlog, BacklogError};
use async_trait::async_trait;
use cortex_core::{ItemType, WorkItem};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for beads commands.
const BEADS_TIMEOUT: Duration = Duration::from_secs(60);

/// Backlog adapter driving the `bd` CLI.
pub struct BeadsBacklog {
    bin: String,
    /// Project name → beads directory.
    project_dirs: HashMap<String, PathBuf>,
}

/// One row of `bd ready --json` output.
#[derive(Debug, Deserialize)]
struct BeadRow {
    id: String,
    #[serde(rename = "type", alias = "issue_type")]
    item_type: ItemType,
    #[serde(default)]
    priority: u32,
    #[serde(alias = "assignee", default)]
    agent: String,
    #[serde(alias = "dependencies", default)]
    depends_on: Vec<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    created_at_ms: i64,
}

impl From<BeadRow> for WorkItem {
    fn from(row: BeadRow) -> Self {
        WorkItem {
            id: row.id,
            item_type: row.item_type,
            priority: row.priority,
            agent: row.agent,
            depends_on: row.depends_on,
            title: row.title,
            created_at_ms: row.created_at_ms,
        }
    }
}

impl BeadsBacklog {
    pub fn new(bin: impl Into<String>, project_dirs: HashMap<String, PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            project_dirs,
        }
    }

    fn dir_for(&self, project: &str) -> Result<&PathBuf, BacklogError> {
        self.project_dirs
            .get(project)
            .ok_or_else(|| BacklogError::UnknownProject(project.to_string()))
    }

    async fn run(&self, project: &str, args: &[&str]) -> Result<Vec<u8>, BacklogError> {
        let dir = self.dir_for(project)?;
        let mut cmd = Command::new(&self.bin);
        cmd.args(args).current_dir(dir);

        // A wedged tracker must not stall the tick past its own project
        let verb = args.first().copied().unwrap_or("");
        let output = match tokio::time::timeout(BEADS_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(BacklogError::CommandFailed(format!(
                    "bd {} could not run: {}",
                    verb, err
                )));
            }
            Err(_elapsed) => {
                return Err(BacklogError::CommandFailed(format!(
                    "bd {} gave no result within {}s",
                    verb,
                    BEADS_TIMEOUT.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BacklogError::CommandFailed(format!(
                "bd {} exited {:?}: {}",
                verb,
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Backlog for BeadsBacklog {
    async fn list_ready(&self, project: &str) -> Result<Vec<WorkItem>, BacklogError> {
        let stdout = self.run(project, &["ready", "--json"]).await?;
        let rows: Vec<BeadRow> =
            serde_json::from_slice(&stdout).map_err(|e| BacklogError::Parse(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter(|row| !row.item_type.is_epic())
            .map(WorkItem::from)
            .collect())
    }

    async fn update_priority(
        &self,
        project: &str,
        id: &str,
        priority: u32,
    ) -> Result<(), BacklogError> {
        let priority = priority.to_string();
        self.run(project, &["update", id, "--priority", &priority])
            .await?;
        Ok(())
    }

    async fn create(
        &self,
        project: &str,
        title: &str,
        item_type: ItemType,
        priority: u32,
        description: &str,
    ) -> Result<String, BacklogError> {
        let priority = priority.to_string();
        let stdout = self
            .run(
                project,
                &[
                    "create", "--json", "--title", title, "--type", item_type.as_str(),
                    "--priority", &priority, "--description", description,
                ],
            )
            .await?;

        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created =
            serde_json::from_slice(&stdout).map_err(|e| BacklogError::Parse(e.to_string()))?;
        Ok(created.id)
    }
}

#[cfg(test)]
#[path = "beads_tests.rs"]
mod tests;
