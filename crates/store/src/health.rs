// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health events and scheduler pause state

use crate::{Store, StoreError};
use cortex_core::{HealthEvent, HealthEventType, SchedulerRunState};
use rusqlite::params;

impl Store {
    /// Append a health event. Events are append-only; `dispatch_id` is `0`
    /// for global observations.
    pub fn append_health_event(
        &self,
        event_type: HealthEventType,
        dispatch_id: i64,
        message: &str,
        created_at_ms: i64,
    ) -> Result<i64, StoreError> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO health_events (event_type, dispatch_id, message, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_type.as_str(), dispatch_id, message, created_at_ms],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// The most recent `limit` health events, newest first.
    pub fn recent_health_events(&self, limit: u32) -> Result<Vec<HealthEvent>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_type, dispatch_id, message, created_at_ms \
                 FROM health_events ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                let raw: String = row.get("event_type")?;
                let event_type = raw.parse().map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        format!("bad event_type value: {}", raw).into(),
                    )
                })?;
                Ok(HealthEvent {
                    id: row.get("id")?,
                    event_type,
                    dispatch_id: row.get("dispatch_id")?,
                    message: row.get("message")?,
                    created_at_ms: row.get("created_at_ms")?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Current scheduler run state with its last-updated timestamp.
    pub fn get_scheduler_state(&self) -> Result<(SchedulerRunState, i64), StoreError> {
        self.with_conn(|conn| {
            let (raw, updated_at_ms): (String, i64) = conn.query_row(
                "SELECT state, updated_at_ms FROM scheduler_state WHERE id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            let state = raw
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("bad scheduler state: {}", raw)))?;
            Ok((state, updated_at_ms))
        })
    }

    /// Persist the scheduler run state. Idempotent: setting the current state
    /// again still refreshes `updated_at_ms`.
    pub fn set_scheduler_state(
        &self,
        state: SchedulerRunState,
        updated_at_ms: i64,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE scheduler_state SET state = ?1, updated_at_ms = ?2 WHERE id = 1",
                params![state.as_str(), updated_at_ms],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
