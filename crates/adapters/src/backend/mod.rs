// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch backends.
//!
//! A backend launches the agent process for a dispatch and supervises it to
//! a terminal state. Handles are opaque numeric ids: the subprocess backend
//! uses the OS pid, the session backend a stable hash of the tmux session
//! name. The scheduler and reaper only ever see the capability set
//! `{dispatch, status, capture_output, kill, cleanup}`.

mod subprocess;
mod tmux;

pub use subprocess::SubprocessBackend;
pub use tmux::TmuxBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, FakeBackend};

use crate::command::CommandError;
use async_trait::async_trait;
use cortex_core::{BackendKind, CliConfig, Dispatch, PromptMode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for tmux supervisor commands.
pub(crate) const TMUX_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `kill` waits after SIGTERM before sending SIGKILL.
pub(crate) const TERM_GRACE: Duration = Duration::from_secs(5);

/// Run a supervisor-side command (tmux queries, session control) with a
/// bounded wait.
///
/// A backend that blocks on its multiplexer would stall the tick and the
/// reaper, so every such call goes through here. The hung child is killed
/// when the timeout fires (tokio's `Child` drop).
pub(crate) async fn run_supervised(
    mut cmd: tokio::process::Command,
    timeout: Duration,
    what: &str,
) -> Result<std::process::Output, BackendError> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(BackendError::CommandFailed(format!(
            "{} could not run: {}",
            what, err
        ))),
        Err(_elapsed) => Err(BackendError::CommandFailed(format!(
            "{} gave no result within {}s",
            what,
            timeout.as_secs()
        ))),
    }
}

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("backend command failed: {0}")]
    CommandFailed(String),
    #[error("prompt mode {0:?} is not supported by this backend")]
    UnsupportedPromptMode(PromptMode),
    #[error("flag templates reference {{prompt}}, which cannot cross a session boundary")]
    InlinePrompt,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether the failure is a configuration bug (bad flag templates, bad
    /// prompt mode) rather than a transient launch failure.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BackendError::Command(_)
                | BackendError::UnsupportedPromptMode(_)
                | BackendError::InlinePrompt
        )
    }
}

/// Everything a backend needs to launch one dispatch.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub work_item: String,
    pub project: String,
    pub agent: String,
    pub cli: CliConfig,
    pub model: String,
    pub prompt: String,
    pub work_dir: PathBuf,
}

/// Result of a successful launch.
#[derive(Debug, Clone)]
pub struct Launched {
    pub handle: i64,
    /// Set by the session backend so the store can rebind after restart.
    pub session_name: Option<String>,
    pub log_path: PathBuf,
}

/// Observed state of a dispatched process.
///
/// `Completed`/`Failed` are only ever reported once the exit code is
/// observable; until then the state is `Running` or `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Running,
    Completed,
    Failed { exit_code: i32 },
    Unknown,
}

impl BackendStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackendStatus::Completed | BackendStatus::Failed { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            BackendStatus::Completed => 0,
            BackendStatus::Failed { exit_code } => *exit_code,
            BackendStatus::Running | BackendStatus::Unknown => -1,
        }
    }
}

/// Capability set every dispatch backend exposes.
#[async_trait]
pub trait DispatchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Launch the agent process. Must return a handle within bounded time;
    /// the process itself keeps running after this call returns.
    async fn dispatch(&self, spec: LaunchSpec) -> Result<Launched, BackendError>;

    /// Current observed state for a handle. Unknown handles report
    /// [`BackendStatus::Unknown`] rather than erroring, so the reaper can
    /// categorize dispatches that predate a restart.
    async fn status(&self, handle: i64) -> Result<BackendStatus, BackendError>;

    /// Combined output captured so far for a handle.
    async fn capture_output(&self, handle: i64) -> Result<Vec<u8>, BackendError>;

    /// Terminate the process behind a handle. No-op when already dead.
    async fn kill(&self, handle: i64) -> Result<(), BackendError>;

    /// Send a graceful interrupt ahead of shutdown. Default no-op; the
    /// session backend forwards it into the pane.
    async fn interrupt(&self, _handle: i64) -> Result<(), BackendError> {
        Ok(())
    }

    /// Delete temp files and logs tracked for a handle and forget it.
    async fn cleanup(&self, handle: i64) -> Result<(), BackendError>;

    /// Re-attach a handle from a persisted dispatch after restart. Returns
    /// `true` when the underlying process/session is still alive.
    async fn rebind(&self, dispatch: &Dispatch) -> Result<bool, BackendError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
