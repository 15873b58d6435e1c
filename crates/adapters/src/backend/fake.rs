// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake dispatch backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{BackendError, BackendStatus, DispatchBackend, LaunchSpec, Launched};
use async_trait::async_trait;
use cortex_core::{BackendKind, Dispatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Recorded backend call
#[derive(Debug, Clone)]
pub enum BackendCall {
    Dispatch { work_item: String, project: String, agent: String },
    Status { handle: i64 },
    CaptureOutput { handle: i64 },
    Kill { handle: i64 },
    Interrupt { handle: i64 },
    Cleanup { handle: i64 },
    Rebind { handle: i64 },
}

struct FakeBackendState {
    calls: Vec<BackendCall>,
    launches: Vec<LaunchSpec>,
    statuses: HashMap<i64, BackendStatus>,
    outputs: HashMap<i64, Vec<u8>>,
    fail_next: Option<String>,
    next_handle: i64,
}

/// Scriptable in-memory backend recording every call.
#[derive(Clone)]
pub struct FakeBackend {
    kind: BackendKind,
    inner: Arc<Mutex<FakeBackendState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new(BackendKind::Subprocess)
    }
}

impl FakeBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            inner: Arc::new(Mutex::new(FakeBackendState {
                calls: Vec::new(),
                launches: Vec::new(),
                statuses: HashMap::new(),
                outputs: HashMap::new(),
                fail_next: None,
                next_handle: 1000,
            })),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Launch specs in dispatch order
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.inner.lock().launches.clone()
    }

    pub fn dispatched_count(&self) -> usize {
        self.inner.lock().launches.len()
    }

    /// Script the status a handle reports from now on
    pub fn set_status(&self, handle: i64, status: BackendStatus) {
        self.inner.lock().statuses.insert(handle, status);
    }

    /// Script the captured output for a handle
    pub fn set_output(&self, handle: i64, output: Vec<u8>) {
        self.inner.lock().outputs.insert(handle, output);
    }

    /// Make the next dispatch fail with a spawn error
    pub fn fail_next_dispatch(&self, message: &str) {
        self.inner.lock().fail_next = Some(message.to_string());
    }

    pub fn kill_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Kill { .. }))
            .count()
    }
}

#[async_trait]
impl DispatchBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn dispatch(&self, spec: LaunchSpec) -> Result<Launched, BackendError> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next.take() {
            return Err(BackendError::SpawnFailed(message));
        }

        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.calls.push(BackendCall::Dispatch {
            work_item: spec.work_item.clone(),
            project: spec.project.clone(),
            agent: spec.agent.clone(),
        });
        inner.launches.push(spec);
        inner.statuses.insert(handle, BackendStatus::Running);

        let session_name = match self.kind {
            BackendKind::Session => Some(format!("ctx-fake-{}", handle)),
            BackendKind::Subprocess => None,
        };

        Ok(Launched {
            handle,
            session_name,
            log_path: PathBuf::from(format!("/tmp/fake-{}.log", handle)),
        })
    }

    async fn status(&self, handle: i64) -> Result<BackendStatus, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Status { handle });
        Ok(inner
            .statuses
            .get(&handle)
            .copied()
            .unwrap_or(BackendStatus::Unknown))
    }

    async fn capture_output(&self, handle: i64) -> Result<Vec<u8>, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::CaptureOutput { handle });
        Ok(inner.outputs.get(&handle).cloned().unwrap_or_default())
    }

    async fn kill(&self, handle: i64) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Kill { handle });
        inner.statuses.insert(handle, BackendStatus::Unknown);
        Ok(())
    }

    async fn interrupt(&self, handle: i64) -> Result<(), BackendError> {
        self.inner.lock().calls.push(BackendCall::Interrupt { handle });
        Ok(())
    }

    async fn cleanup(&self, handle: i64) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Cleanup { handle });
        inner.statuses.remove(&handle);
        inner.outputs.remove(&handle);
        Ok(())
    }

    async fn rebind(&self, dispatch: &Dispatch) -> Result<bool, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Rebind {
            handle: dispatch.handle,
        });
        Ok(matches!(
            inner.statuses.get(&dispatch.handle),
            Some(BackendStatus::Running)
        ))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
