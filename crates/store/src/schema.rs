// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema definition and additive migration chain.
//!
//! Each entry in [`MIGRATIONS`] upgrades the schema by one version; index
//! `i` migrates `v(i)` → `v(i+1)`. Evolution is additive: released
//! migrations are never edited, new ones are appended.

use crate::StoreError;
use rusqlite::Connection;

/// Current schema version. Bump when appending to [`MIGRATIONS`].
pub const SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[&str] = &[
    // v0 → v1: initial schema
    "
    CREATE TABLE dispatches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        work_item TEXT NOT NULL,
        project TEXT NOT NULL,
        agent TEXT NOT NULL,
        provider TEXT NOT NULL,
        tier TEXT NOT NULL,
        backend TEXT NOT NULL,
        handle INTEGER NOT NULL,
        session_name TEXT,
        work_dir TEXT NOT NULL,
        log_path TEXT NOT NULL,
        prompt TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'running',
        exit_code INTEGER NOT NULL DEFAULT -1,
        dispatched_at_ms INTEGER NOT NULL,
        completed_at_ms INTEGER,
        retries INTEGER NOT NULL DEFAULT 0,
        failure_category TEXT,
        failure_summary TEXT
    );
    CREATE INDEX idx_dispatches_state ON dispatches(state);
    CREATE INDEX idx_dispatches_item ON dispatches(work_item, project);
    CREATE UNIQUE INDEX idx_dispatches_one_running
        ON dispatches(work_item, project) WHERE state = 'running';

    CREATE TABLE provider_usage (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        provider TEXT NOT NULL,
        agent TEXT NOT NULL,
        work_item TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX idx_provider_usage_created ON provider_usage(created_at_ms);

    CREATE TABLE health_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        dispatch_id INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX idx_health_events_created ON health_events(created_at_ms);

    CREATE TABLE scheduler_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        state TEXT NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );
    INSERT INTO scheduler_state (id, state, updated_at_ms) VALUES (1, 'running', 0);
    ",
];

/// Migrate the database to [`SCHEMA_VERSION`].
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO schema_version (id, version) VALUES (1, 0);",
    )?;

    let current: u32 =
        tx.query_row("SELECT version FROM schema_version WHERE id = 1", [], |r| {
            r.get(0)
        })?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for version in current..SCHEMA_VERSION {
        let script = MIGRATIONS
            .get(version as usize)
            .ok_or_else(|| StoreError::Corrupt(format!("no migration from v{}", version)))?;
        tracing::info!(from = version, to = version + 1, "migrating store schema");
        tx.execute_batch(script)?;
    }

    tx.execute(
        "UPDATE schema_version SET version = ?1 WHERE id = 1",
        [SCHEMA_VERSION],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
