// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable state store for Cortex, backed by an embedded SQLite file.
//!
//! The store exclusively owns the four persisted entities: dispatches,
//! provider usage, health events, and scheduler state. All mutating APIs are
//! transactional; the connection sits behind a mutex so writers serialize
//! while the daemon's readers stay short-lived. Callers must not hold query
//! results across backend calls.

mod dispatch;
mod health;
mod schema;
mod usage;

pub use dispatch::{LastAttempt, NewDispatch};
pub use schema::SCHEMA_VERSION;
pub use usage::{WINDOW_5H_MS, WINDOW_WEEKLY_MS};

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Errors from durable-state operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("dispatch {id} not found")]
    NotFound { id: i64 },
    #[error("a dispatch is already running for {work_item} in {project}")]
    AlreadyRunning { work_item: String, project: String },
    #[error("dispatch {id} is already terminal ({state})")]
    AlreadyTerminal { id: i64, state: String },
    #[error("invalid stored value: {0}")]
    Corrupt(String),
    #[error("store schema v{found} is newer than supported (v{supported})")]
    SchemaTooNew { found: u32, supported: u32 },
}

/// Handle to the embedded store.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if necessary) the store at `path` and migrate it to the
    /// current schema version.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("cannot create state dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Test use only; the daemon always opens a file.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let mut conn = conn;
        schema::migrate(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
