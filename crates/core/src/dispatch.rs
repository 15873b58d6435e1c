// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch records and lifecycle states

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a dispatch.
///
/// Terminal states (`completed`, `failed`, `cancelled`) are write-once;
/// `unknown` may still transition to a terminal state once the reaper
/// categorizes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchState::Completed | DispatchState::Failed | DispatchState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Running => "running",
            DispatchState::Completed => "completed",
            DispatchState::Failed => "failed",
            DispatchState::Cancelled => "cancelled",
            DispatchState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DispatchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(DispatchState::Running),
            "completed" => Ok(DispatchState::Completed),
            "failed" => Ok(DispatchState::Failed),
            "cancelled" => Ok(DispatchState::Cancelled),
            "unknown" => Ok(DispatchState::Unknown),
            other => Err(format!("unknown dispatch state: {}", other)),
        }
    }
}

/// Closed vocabulary of terminal-failure diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Wall-clock timeout exceeded; the reaper killed the dispatch.
    StuckDispatch,
    /// The multiplexer session vanished before an exit code was observed.
    SessionDisappeared,
    /// Backend reported terminal but the exit code is unobservable.
    UnknownExitState,
    /// The backend could not start the process at all.
    DispatchFailed,
    /// The agent process exited with a non-zero code.
    NonzeroExit,
    /// Cancelled through the control surface.
    Cancelled,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::StuckDispatch => "stuck_dispatch",
            FailureCategory::SessionDisappeared => "session_disappeared",
            FailureCategory::UnknownExitState => "unknown_exit_state",
            FailureCategory::DispatchFailed => "dispatch_failed",
            FailureCategory::NonzeroExit => "nonzero_exit",
            FailureCategory::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stuck_dispatch" => Ok(FailureCategory::StuckDispatch),
            "session_disappeared" => Ok(FailureCategory::SessionDisappeared),
            "unknown_exit_state" => Ok(FailureCategory::UnknownExitState),
            "dispatch_failed" => Ok(FailureCategory::DispatchFailed),
            "nonzero_exit" => Ok(FailureCategory::NonzeroExit),
            "cancelled" => Ok(FailureCategory::Cancelled),
            other => Err(format!("unknown failure category: {}", other)),
        }
    }
}

/// Which backend owns a dispatch's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Subprocess,
    Session,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Subprocess => "subprocess",
            BackendKind::Session => "session",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subprocess" => Ok(BackendKind::Subprocess),
            "session" => Ok(BackendKind::Session),
            other => Err(format!("unknown backend kind: {}", other)),
        }
    }
}

/// One attempt to run a work item with a provider.
///
/// `exit_code` is `-1` until the dispatch reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: i64,
    pub work_item: String,
    pub project: String,
    pub agent: String,
    pub provider: String,
    pub tier: Tier,
    pub backend: BackendKind,
    /// Backend-opaque numeric handle: pid for subprocess, name hash for session.
    pub handle: i64,
    /// Multiplexer session name, when the session backend owns the handle.
    pub session_name: Option<String>,
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    pub prompt: String,
    pub state: DispatchState,
    pub exit_code: i32,
    pub dispatched_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub retries: u32,
    pub failure_category: Option<FailureCategory>,
    pub failure_summary: Option<String>,
}

impl Dispatch {
    pub fn is_running(&self) -> bool {
        self.state == DispatchState::Running
    }

    /// Age of the dispatch in milliseconds at the given instant.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.dispatched_at_ms)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
