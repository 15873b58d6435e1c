// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess dispatch backend.
//!
//! Launches the agent CLI as a detached child process. The prompt and any
//! other large parameters cross into the child via temp files whose paths
//! are argv entries; stdout and stderr share one log file descriptor. A
//! waiter task records the exit code when the child dies, so `status` is
//! never guessed.

use super::{BackendError, BackendStatus, DispatchBackend, LaunchSpec, Launched};
use crate::command::build_argv;
use crate::poll::poll_until;
use super::TERM_GRACE;
use async_trait::async_trait;
use cortex_core::{BackendKind, Dispatch, PromptMode};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProcState {
    /// Child of this process; the waiter will observe its exit.
    Running,
    /// Waiter observed the exit. `None` when neither an exit code nor a
    /// terminating signal was reported.
    Exited { code: Option<i32> },
    /// Re-attached after a daemon restart: liveness is probed by pid, the
    /// exit code is unobservable.
    Rebound,
}

struct ProcEntry {
    pid: i64,
    state: ProcState,
    temp_files: Vec<PathBuf>,
    log_path: PathBuf,
}

/// Dispatch backend that supervises plain child processes.
pub struct SubprocessBackend {
    temp_root: PathBuf,
    log_dir: PathBuf,
    procs: Arc<Mutex<HashMap<i64, ProcEntry>>>,
}

impl SubprocessBackend {
    /// `temp_root` is the process-wide temp directory for prompt files;
    /// `log_dir` receives one log file per dispatch.
    pub fn new(temp_root: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            temp_root,
            log_dir,
            procs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn write_prompt_file(&self, prompt: &str) -> Result<PathBuf, BackendError> {
        std::fs::create_dir_all(&self.temp_root)?;
        let path = self.temp_root.join(format!("prompt-{}.txt", Uuid::new_v4()));
        std::fs::write(&path, prompt)?;
        Ok(path)
    }

    fn probe_alive(pid: i64) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    fn observed_exit(&self, handle: i64) -> Option<Option<i32>> {
        let procs = self.procs.lock();
        match procs.get(&handle).map(|e| e.state) {
            Some(ProcState::Exited { code }) => Some(code),
            _ => None,
        }
    }
}

#[async_trait]
impl DispatchBackend for SubprocessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Subprocess
    }

    async fn dispatch(&self, spec: LaunchSpec) -> Result<Launched, BackendError> {
        let mut temp_files = Vec::new();

        // Prompt transport per CLI prompt mode. User-controlled text only
        // ever crosses as an argv entry or a file path; never a shell string.
        let (prompt_file, stdin): (Option<PathBuf>, Stdio) = match spec.cli.prompt_mode {
            PromptMode::Arg => (None, Stdio::null()),
            PromptMode::File => {
                let path = self.write_prompt_file(&spec.prompt)?;
                temp_files.push(path.clone());
                (Some(path), Stdio::null())
            }
            PromptMode::Stdin => {
                let path = self.write_prompt_file(&spec.prompt)?;
                temp_files.push(path.clone());
                let file = std::fs::File::open(&path)?;
                (None, Stdio::from(file))
            }
        };

        let argv = build_argv(
            &spec.cli.cmd,
            &spec.model,
            &spec.prompt,
            prompt_file.as_deref().and_then(Path::to_str),
            &spec.cli.flag_templates(),
        )?;

        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self
            .log_dir
            .join(format!("dispatch-{}.log", Uuid::new_v4()));
        let log_file = std::fs::File::create(&log_path)?;
        let log_err = log_file.try_clone()?;

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&spec.work_dir)
            .stdin(stdin)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_err))
            // Own process group: the agent outlives a short-lived parent and
            // is never reaped by the parent's cancellation.
            .process_group(0)
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(|e| {
            for f in &temp_files {
                let _ = std::fs::remove_file(f);
            }
            BackendError::SpawnFailed(format!("{}: {}", argv[0], e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| BackendError::SpawnFailed("pid unavailable after spawn".into()))?
            as i64;
        let handle = pid;

        self.procs.lock().insert(
            handle,
            ProcEntry {
                pid,
                state: ProcState::Running,
                temp_files,
                log_path: log_path.clone(),
            },
        );

        tracing::info!(
            work_item = %spec.work_item,
            project = %spec.project,
            agent = %spec.agent,
            pid,
            log_path = %log_path.display(),
            "subprocess dispatched"
        );

        // Waiter: record the exit and drop temp files. The log stays until
        // cleanup.
        let procs = Arc::clone(&self.procs);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().or_else(|| status.signal().map(|s| 128 + s)),
                Err(e) => {
                    tracing::warn!(pid, error = %e, "wait failed for dispatched child");
                    None
                }
            };
            tracing::info!(pid, exit_code = ?code, "dispatched child exited");

            let mut procs = procs.lock();
            if let Some(entry) = procs.get_mut(&handle) {
                entry.state = ProcState::Exited { code };
                for f in entry.temp_files.drain(..) {
                    let _ = std::fs::remove_file(f);
                }
            }
        });

        Ok(Launched {
            handle,
            session_name: None,
            log_path,
        })
    }

    async fn status(&self, handle: i64) -> Result<BackendStatus, BackendError> {
        let state = {
            let procs = self.procs.lock();
            procs.get(&handle).map(|e| (e.state, e.pid))
        };

        Ok(match state {
            None => BackendStatus::Unknown,
            Some((ProcState::Running, _)) => BackendStatus::Running,
            Some((ProcState::Exited { code }, _)) => match code {
                Some(0) => BackendStatus::Completed,
                Some(n) => BackendStatus::Failed { exit_code: n },
                None => BackendStatus::Unknown,
            },
            Some((ProcState::Rebound, pid)) => {
                if Self::probe_alive(pid) {
                    BackendStatus::Running
                } else {
                    // Not our child: the exit code died with it.
                    BackendStatus::Unknown
                }
            }
        })
    }

    async fn capture_output(&self, handle: i64) -> Result<Vec<u8>, BackendError> {
        let log_path = {
            let procs = self.procs.lock();
            procs.get(&handle).map(|e| e.log_path.clone())
        };
        match log_path {
            Some(path) => Ok(std::fs::read(path)?),
            None => Ok(Vec::new()),
        }
    }

    async fn kill(&self, handle: i64) -> Result<(), BackendError> {
        let (pid, running) = {
            let procs = self.procs.lock();
            match procs.get(&handle) {
                None => return Ok(()),
                Some(e) => (e.pid, !matches!(e.state, ProcState::Exited { .. })),
            }
        };
        if !running {
            return Ok(());
        }

        let unix_pid = Pid::from_raw(pid as i32);
        match kill(unix_pid, Signal::SIGTERM) {
            Ok(()) => {}
            // Already dead
            Err(nix::errno::Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(BackendError::CommandFailed(format!("SIGTERM: {}", e))),
        }

        let gone = poll_until(TERM_GRACE, Duration::from_millis(50), || async {
            if Self::probe_alive(pid) {
                None
            } else {
                Some(())
            }
        })
        .await;

        if gone.is_none() {
            tracing::warn!(pid, "child survived SIGTERM grace, sending SIGKILL");
            match kill(unix_pid, Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => return Err(BackendError::CommandFailed(format!("SIGKILL: {}", e))),
            }
        }
        Ok(())
    }

    async fn cleanup(&self, handle: i64) -> Result<(), BackendError> {
        let entry = self.procs.lock().remove(&handle);
        if let Some(entry) = entry {
            for f in &entry.temp_files {
                let _ = std::fs::remove_file(f);
            }
            let _ = std::fs::remove_file(&entry.log_path);
        }
        Ok(())
    }

    async fn rebind(&self, dispatch: &Dispatch) -> Result<bool, BackendError> {
        let pid = dispatch.handle;
        let alive = Self::probe_alive(pid);
        if alive {
            self.procs.lock().insert(
                dispatch.handle,
                ProcEntry {
                    pid,
                    state: ProcState::Rebound,
                    temp_files: Vec::new(),
                    log_path: dispatch.log_path.clone(),
                },
            );
        }
        Ok(alive)
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
