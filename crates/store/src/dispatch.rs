// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch record persistence

use crate::{Store, StoreError};
use cortex_core::{BackendKind, Dispatch, DispatchState, FailureCategory, Tier};
use rusqlite::{params, Row};
use std::path::PathBuf;

/// Parameters for inserting a new dispatch row.
#[derive(Debug, Clone)]
pub struct NewDispatch {
    pub work_item: String,
    pub project: String,
    pub agent: String,
    pub provider: String,
    pub tier: Tier,
    pub backend: BackendKind,
    pub handle: i64,
    pub session_name: Option<String>,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    pub prompt: String,
    pub retries: u32,
    pub dispatched_at_ms: i64,
}

/// Summary of the newest dispatch row for a work item.
#[derive(Debug, Clone, Copy)]
pub struct LastAttempt {
    pub dispatched_at_ms: i64,
    pub retries: u32,
    pub tier: Tier,
    pub state: DispatchState,
}

const DISPATCH_COLS: &str = "id, work_item, project, agent, provider, tier, backend, handle, \
     session_name, work_dir, log_path, prompt, state, exit_code, dispatched_at_ms, \
     completed_at_ms, retries, failure_category, failure_summary";

fn row_to_dispatch(row: &Row<'_>) -> Result<Dispatch, rusqlite::Error> {
    Ok(Dispatch {
        id: row.get("id")?,
        work_item: row.get("work_item")?,
        project: row.get("project")?,
        agent: row.get("agent")?,
        provider: row.get("provider")?,
        tier: parse_col(row, "tier")?,
        backend: parse_col(row, "backend")?,
        handle: row.get("handle")?,
        session_name: row.get("session_name")?,
        work_dir: PathBuf::from(row.get::<_, String>("work_dir")?),
        log_path: PathBuf::from(row.get::<_, String>("log_path")?),
        prompt: row.get("prompt")?,
        state: parse_col(row, "state")?,
        exit_code: row.get("exit_code")?,
        dispatched_at_ms: row.get("dispatched_at_ms")?,
        completed_at_ms: row.get("completed_at_ms")?,
        retries: row.get("retries")?,
        failure_category: parse_opt_col(row, "failure_category")?,
        failure_summary: row.get("failure_summary")?,
    })
}

/// Parse a TEXT column through `FromStr`, mapping failures to a column-level
/// conversion error so they surface as [`StoreError::Sqlite`].
fn parse_col<T: std::str::FromStr>(row: &Row<'_>, col: &'static str) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(col)?;
    raw.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("bad {} value: {}", col, raw).into(),
        )
    })
}

fn parse_opt_col<T: std::str::FromStr>(
    row: &Row<'_>,
    col: &'static str,
) -> Result<Option<T>, rusqlite::Error> {
    let raw: Option<String> = row.get(col)?;
    match raw {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("bad {} value: {}", col, raw).into(),
            )
        }),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store {
    /// Insert a new `running` dispatch row and return its id.
    ///
    /// Fails with [`StoreError::AlreadyRunning`] if another dispatch is
    /// running for the same `(work_item, project)` pair — the store enforces
    /// the invariant with a partial unique index, so racing schedulers cannot
    /// double-dispatch.
    pub fn record_dispatch(&self, new: &NewDispatch) -> Result<i64, StoreError> {
        self.with_tx(|tx| {
            let result = tx.execute(
                "INSERT INTO dispatches (work_item, project, agent, provider, tier, backend, \
                 handle, session_name, work_dir, log_path, prompt, state, exit_code, \
                 dispatched_at_ms, retries) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'running', -1, ?12, ?13)",
                params![
                    new.work_item,
                    new.project,
                    new.agent,
                    new.provider,
                    new.tier.as_str(),
                    new.backend.as_str(),
                    new.handle,
                    new.session_name,
                    new.work_dir.display().to_string(),
                    new.log_path.display().to_string(),
                    new.prompt,
                    new.dispatched_at_ms,
                    new.retries,
                ],
            );

            match result {
                Ok(_) => Ok(tx.last_insert_rowid()),
                Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyRunning {
                    work_item: new.work_item.clone(),
                    project: new.project.clone(),
                }),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Transition a dispatch to a terminal state. Write-once: a second
    /// terminal transition fails with [`StoreError::AlreadyTerminal`].
    pub fn mark_terminal(
        &self,
        id: i64,
        state: DispatchState,
        exit_code: i32,
        completed_at_ms: i64,
        category: Option<FailureCategory>,
        summary: Option<&str>,
    ) -> Result<(), StoreError> {
        if !state.is_terminal() {
            return Err(StoreError::Corrupt(format!(
                "mark_terminal called with non-terminal state {}",
                state
            )));
        }

        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE dispatches SET state = ?2, exit_code = ?3, completed_at_ms = ?4, \
                 failure_category = ?5, failure_summary = ?6 \
                 WHERE id = ?1 AND state IN ('running', 'unknown')",
                params![
                    id,
                    state.as_str(),
                    exit_code,
                    completed_at_ms,
                    category.map(|c| c.as_str()),
                    summary,
                ],
            )?;

            if updated == 1 {
                return Ok(());
            }

            let existing: Option<String> = tx
                .query_row("SELECT state FROM dispatches WHERE id = ?1", [id], |r| {
                    r.get(0)
                })
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            match existing {
                None => Err(StoreError::NotFound { id }),
                Some(state) => Err(StoreError::AlreadyTerminal { id, state }),
            }
        })
    }

    /// Transition a `running` dispatch to `unknown` (restart rebinding found
    /// no live process). No-op if the row is not running.
    pub fn mark_unknown(&self, id: i64) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE dispatches SET state = 'unknown' WHERE id = ?1 AND state = 'running'",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn get_dispatch(&self, id: i64) -> Result<Option<Dispatch>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM dispatches WHERE id = ?1",
                DISPATCH_COLS
            ))?;
            let mut rows = stmt.query_map([id], row_to_dispatch)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    /// All dispatches currently in `running` or `unknown` state, oldest first.
    pub fn list_running(&self) -> Result<Vec<Dispatch>, StoreError> {
        self.query_dispatches(
            "WHERE state IN ('running', 'unknown') ORDER BY dispatched_at_ms ASC",
            [],
        )
    }

    /// Terminal dispatches for a project completed at or after `since_ms`.
    pub fn list_completed_since(
        &self,
        project: &str,
        since_ms: i64,
    ) -> Result<Vec<Dispatch>, StoreError> {
        self.query_dispatches(
            "WHERE project = ?1 AND state IN ('completed', 'failed', 'cancelled') \
             AND completed_at_ms >= ?2 ORDER BY completed_at_ms ASC",
            params![project, since_ms],
        )
    }

    /// Full dispatch history for a work item, oldest attempt first.
    pub fn dispatches_for_item(&self, work_item: &str) -> Result<Vec<Dispatch>, StoreError> {
        self.query_dispatches("WHERE work_item = ?1 ORDER BY id ASC", params![work_item])
    }

    /// The live dispatch owned by `agent`, if any. Used for per-agent
    /// serialization in the scheduler.
    pub fn running_for_agent(&self, agent: &str) -> Result<Option<Dispatch>, StoreError> {
        let mut rows = self.query_dispatches(
            "WHERE agent = ?1 AND state = 'running' LIMIT 1",
            params![agent],
        )?;
        Ok(rows.pop())
    }

    /// The most recent attempt for a work item, if it has been dispatched
    /// before. Drives backoff admissibility and tier escalation.
    pub fn last_attempt(
        &self,
        work_item: &str,
        project: &str,
    ) -> Result<Option<LastAttempt>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT dispatched_at_ms, retries, tier, state FROM dispatches \
                 WHERE work_item = ?1 AND project = ?2 ORDER BY id DESC LIMIT 1",
                params![work_item, project],
                |r| {
                    Ok(LastAttempt {
                        dispatched_at_ms: r.get(0)?,
                        retries: r.get(1)?,
                        tier: parse_col(r, "tier")?,
                        state: parse_col(r, "state")?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
        })
    }

    pub fn count_running(&self) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM dispatches WHERE state = 'running'",
                [],
                |r| r.get(0),
            )?)
        })
    }

    /// Terminal failures recorded at or after `since_ms`.
    pub fn count_recent_failures(&self, since_ms: i64) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM dispatches \
                 WHERE state = 'failed' AND completed_at_ms >= ?1",
                [since_ms],
                |r| r.get(0),
            )?)
        })
    }

    /// Backdate a dispatch. Production use is limited to the reaper's
    /// retry-window bookkeeping; tests use it to age rows.
    pub fn set_dispatch_time(&self, id: i64, dispatched_at_ms: i64) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE dispatches SET dispatched_at_ms = ?2 WHERE id = ?1",
                params![id, dispatched_at_ms],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound { id });
            }
            Ok(())
        })
    }

    fn query_dispatches(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Dispatch>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM dispatches {}", DISPATCH_COLS, clause))?;
            let rows = stmt.query_map(params, row_to_dispatch)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
