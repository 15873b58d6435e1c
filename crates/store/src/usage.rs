// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider-usage rows for rate-limit accounting.
//!
//! Rows are inserted on successful reservation and deleted only on
//! reservation rollback; window queries filter by `created_at_ms` instead of
//! pruning.

use crate::{Store, StoreError};
use rusqlite::params;

/// Five-hour rolling window, in milliseconds.
pub const WINDOW_5H_MS: i64 = 5 * 60 * 60 * 1000;
/// Seven-day rolling window, in milliseconds.
pub const WINDOW_WEEKLY_MS: i64 = 7 * 24 * 60 * 60 * 1000;

impl Store {
    /// Insert a usage row for an authed-provider dispatch. Returns the row id
    /// the caller must keep to roll the reservation back.
    pub fn record_provider_usage(
        &self,
        provider: &str,
        agent: &str,
        work_item: &str,
        created_at_ms: i64,
    ) -> Result<i64, StoreError> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO provider_usage (provider, agent, work_item, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![provider, agent, work_item, created_at_ms],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Delete a usage row (reservation rollback). Deleting an absent row is a
    /// no-op so release guards stay idempotent.
    pub fn delete_provider_usage(&self, id: i64) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM provider_usage WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Usage count within the 5-hour window ending at `now_ms`.
    pub fn count_authed_usage_5h(&self, now_ms: i64) -> Result<u32, StoreError> {
        self.count_usage_since(now_ms - WINDOW_5H_MS)
    }

    /// Usage count within the 7-day window ending at `now_ms`.
    pub fn count_authed_usage_weekly(&self, now_ms: i64) -> Result<u32, StoreError> {
        self.count_usage_since(now_ms - WINDOW_WEEKLY_MS)
    }

    fn count_usage_since(&self, since_ms: i64) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM provider_usage WHERE created_at_ms >= ?1",
                [since_ms],
                |r| r.get(0),
            )?)
        })
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
