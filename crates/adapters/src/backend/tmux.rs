// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session dispatch backend.
//!
//! Runs the agent inside a named tmux session so the process survives daemon
//! restarts. The pane is prepared before the agent command starts: the
//! session opens on the default shell, `remain-on-exit` is set as a window
//! option, and the command is then respawned into the pane. The pane's dead
//! state and `#{pane_dead_status}` therefore stay observable even for a
//! command that exits immediately; `status` maps them onto the backend
//! status vocabulary.
//!
//! The prompt crosses into the session as a temp file. For `stdin` CLIs a
//! thin wrapper script redirects the file to the child's stdin; the wrapper
//! takes its inputs as positional parameters and is the sole shell
//! touchpoint for user-controlled text.

use super::{
    run_supervised, BackendError, BackendStatus, DispatchBackend, LaunchSpec, Launched,
    TMUX_TIMEOUT,
};
use crate::command::build_argv;
use async_trait::async_trait;
use cortex_core::{BackendKind, Clock, Dispatch, PromptMode};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use uuid::Uuid;

/// Prefix of every session this daemon creates. The startup sweep
/// enumerates sessions carrying it to adopt or kill orphans.
pub const SESSION_PREFIX: &str = "ctx-";

/// Wrapper whose only job is `exec < prompt-file; exec argv...`. Inputs
/// arrive as positional parameters, never by interpolation.
const STDIN_WRAPPER: &str = "#!/bin/sh\nexec < \"$1\"\nshift\nexec \"$@\"\n";

struct SessionEntry {
    name: String,
    temp_files: Vec<PathBuf>,
    log_path: PathBuf,
}

/// Dispatch backend that supervises tmux sessions.
pub struct TmuxBackend {
    temp_root: PathBuf,
    log_dir: PathBuf,
    clock: Arc<dyn Clock>,
    sessions: Arc<Mutex<HashMap<i64, SessionEntry>>>,
}

/// Derive the numeric handle from a session name: the first eight bytes of
/// its SHA-256, masked non-negative. Stable across restarts so the store can
/// rebind handles without parsing names.
pub fn handle_for_session(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (i64::from_be_bytes(bytes)) & i64::MAX
}

/// Sanitize a name fragment for tmux: the multiplexer reserves `.` and `:`,
/// and anything else exotic becomes a hyphen too.
fn sanitize(fragment: &str) -> String {
    fragment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect()
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

impl TmuxBackend {
    pub fn new(temp_root: PathBuf, log_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            temp_root,
            log_dir,
            clock,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn session_name(&self, project: &str, agent: &str) -> String {
        format!(
            "{}{}-{}-{}",
            SESSION_PREFIX,
            sanitize(project),
            sanitize(agent),
            self.clock.now_secs()
        )
    }

    fn write_temp(&self, name: &str, content: &str) -> Result<PathBuf, BackendError> {
        std::fs::create_dir_all(&self.temp_root)?;
        let path = self.temp_root.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    async fn tmux(&self, args: &[&str], description: &str) -> Result<std::process::Output, BackendError> {
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        run_supervised(cmd, TMUX_TIMEOUT, description).await
    }

    fn entry_name(&self, handle: i64) -> Option<String> {
        self.sessions.lock().get(&handle).map(|e| e.name.clone())
    }

    /// All live sessions carrying [`SESSION_PREFIX`]. Empty when no tmux
    /// server is running.
    pub async fn list_cortex_sessions(&self) -> Vec<String> {
        let output = self
            .tmux(&["list-sessions", "-F", "#{session_name}"], "tmux list-sessions")
            .await;
        match output {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|name| name.starts_with(SESSION_PREFIX))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Kill a session by name (orphan sweep). Missing sessions are fine.
    pub async fn kill_session_named(&self, name: &str) -> Result<(), BackendError> {
        self.tmux(&["kill-session", "-t", name], "tmux kill-session").await?;
        Ok(())
    }

    /// Arm a freshly created window for exit capture, then respawn its pane
    /// onto the agent command.
    ///
    /// `remain-on-exit` is a window option and must be active before the
    /// command starts, otherwise an instantly-failing command takes the
    /// whole session with it and the exit code becomes unobservable.
    async fn prepare_pane(
        &self,
        name: &str,
        log_path: &Path,
        command_line: &str,
    ) -> Result<(), BackendError> {
        let set = self
            .tmux(
                &["set-option", "-w", "-t", name, "remain-on-exit", "on"],
                "tmux set-option",
            )
            .await?;
        if !set.status.success() {
            return Err(BackendError::SpawnFailed(format!(
                "cannot set remain-on-exit: {}",
                String::from_utf8_lossy(&set.stderr).trim()
            )));
        }

        // Mirror pane output into the log file. Losing this costs output
        // capture only, never exit-state tracking.
        let pipe_target = format!("cat >> {}", shell_quote(&log_path.display().to_string()));
        let piped = self
            .tmux(
                &["pipe-pane", "-t", name, "-o", &pipe_target],
                "tmux pipe-pane",
            )
            .await?;
        if !piped.status.success() {
            tracing::warn!(session = %name, "pipe-pane failed, pane output will not be logged");
        }

        let respawned = self
            .tmux(
                &["respawn-pane", "-k", "-t", name, command_line],
                "tmux respawn-pane",
            )
            .await?;
        if !respawned.status.success() {
            return Err(BackendError::SpawnFailed(format!(
                "respawn-pane: {}",
                String::from_utf8_lossy(&respawned.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchBackend for TmuxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Session
    }

    async fn dispatch(&self, spec: LaunchSpec) -> Result<Launched, BackendError> {
        if !spec.work_dir.exists() {
            return Err(BackendError::SpawnFailed(format!(
                "working directory does not exist: {}",
                spec.work_dir.display()
            )));
        }

        // Inline prompts cannot cross tmux's argument join without becoming
        // shell text again; session-routed CLIs must read from a file or stdin.
        if spec.cli.prompt_mode == PromptMode::Arg {
            return Err(BackendError::UnsupportedPromptMode(PromptMode::Arg));
        }
        if spec
            .cli
            .flag_templates()
            .iter()
            .any(|flag| flag.contains("{prompt}"))
        {
            return Err(BackendError::InlinePrompt);
        }

        let mut temp_files = Vec::new();
        let prompt_path =
            self.write_temp(&format!("prompt-{}.txt", Uuid::new_v4()), &spec.prompt)?;
        temp_files.push(prompt_path.clone());

        let argv = match spec.cli.prompt_mode {
            PromptMode::Arg => {
                return Err(BackendError::UnsupportedPromptMode(PromptMode::Arg));
            }
            PromptMode::File => build_argv(
                &spec.cli.cmd,
                &spec.model,
                &spec.prompt,
                prompt_path.to_str(),
                &spec.cli.flag_templates(),
            )?,
            PromptMode::Stdin => {
                let wrapper = self.write_temp("stdin-exec.sh", STDIN_WRAPPER)?;
                let inner = build_argv(
                    &spec.cli.cmd,
                    &spec.model,
                    &spec.prompt,
                    None,
                    &spec.cli.flag_templates(),
                )?;
                let mut argv = vec![
                    "/bin/sh".to_string(),
                    wrapper.display().to_string(),
                    prompt_path.display().to_string(),
                ];
                argv.extend(inner);
                argv
            }
        };

        let name = self.session_name(&spec.project, &spec.agent);
        let handle = handle_for_session(&name);

        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_dir.join(format!("{}.log", name));

        // Every argv entry is config text or a backend-generated path; the
        // prompt itself stays inside the temp file. Quoting here is
        // mechanical, not interpolation of user content.
        let command_line = argv
            .iter()
            .map(|entry| shell_quote(entry))
            .collect::<Vec<_>>()
            .join(" ");

        let work_dir = spec.work_dir.display().to_string();
        // The session opens on the default shell so remain-on-exit and the
        // log pipe are in force before the agent command can exit.
        let created = self
            .tmux(
                &["new-session", "-d", "-s", &name, "-c", &work_dir],
                "tmux new-session",
            )
            .await?;

        if !created.status.success() {
            let stderr = String::from_utf8_lossy(&created.stderr);
            tracing::error!(session = %name, stderr = %stderr, "tmux spawn failed");
            for f in &temp_files {
                let _ = std::fs::remove_file(f);
            }
            return Err(BackendError::SpawnFailed(stderr.to_string()));
        }

        if let Err(err) = self.prepare_pane(&name, &log_path, &command_line).await {
            let _ = self
                .tmux(&["kill-session", "-t", &name], "tmux kill-session")
                .await;
            for f in &temp_files {
                let _ = std::fs::remove_file(f);
            }
            return Err(err);
        }

        self.sessions.lock().insert(
            handle,
            SessionEntry {
                name: name.clone(),
                temp_files,
                log_path: log_path.clone(),
            },
        );

        tracing::info!(
            work_item = %spec.work_item,
            project = %spec.project,
            agent = %spec.agent,
            session = %name,
            handle,
            "session dispatched"
        );

        Ok(Launched {
            handle,
            session_name: Some(name),
            log_path,
        })
    }

    async fn status(&self, handle: i64) -> Result<BackendStatus, BackendError> {
        let Some(name) = self.entry_name(handle) else {
            return Ok(BackendStatus::Unknown);
        };

        let output = self
            .tmux(
                &[
                    "display-message", "-p", "-t", &name,
                    "#{pane_dead} #{pane_dead_status}",
                ],
                "tmux display-message",
            )
            .await?;

        if !output.status.success() {
            // Session gone without an observable exit
            return Ok(BackendStatus::Unknown);
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let mut parts = raw.trim_end().splitn(2, ' ');
        let dead = parts.next().unwrap_or("");
        let dead_status = parts.next().unwrap_or("").trim();

        Ok(match dead {
            "0" => BackendStatus::Running,
            "1" => match dead_status.parse::<i32>() {
                Ok(0) => BackendStatus::Completed,
                Ok(code) => BackendStatus::Failed { exit_code: code },
                // Pane died without reporting a status (e.g. signal)
                Err(_) => BackendStatus::Unknown,
            },
            _ => BackendStatus::Unknown,
        })
    }

    async fn capture_output(&self, handle: i64) -> Result<Vec<u8>, BackendError> {
        let (name, log_path) = {
            let sessions = self.sessions.lock();
            match sessions.get(&handle) {
                Some(e) => (e.name.clone(), e.log_path.clone()),
                None => return Ok(Vec::new()),
            }
        };

        if log_path.exists() {
            return Ok(std::fs::read(log_path)?);
        }

        // Fall back to a pane snapshot (rebound sessions have no pipe log)
        let output = self
            .tmux(
                &["capture-pane", "-t", &name, "-p", "-S", "-1000"],
                "tmux capture-pane",
            )
            .await?;
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(output.stdout)
    }

    async fn kill(&self, handle: i64) -> Result<(), BackendError> {
        let Some(name) = self.entry_name(handle) else {
            return Ok(());
        };
        // Failure means the session is already dead, which is fine
        self.tmux(&["kill-session", "-t", &name], "tmux kill-session").await?;
        Ok(())
    }

    async fn interrupt(&self, handle: i64) -> Result<(), BackendError> {
        let Some(name) = self.entry_name(handle) else {
            return Ok(());
        };
        self.tmux(&["send-keys", "-t", &name, "C-c"], "tmux send-keys")
            .await?;
        Ok(())
    }

    async fn cleanup(&self, handle: i64) -> Result<(), BackendError> {
        let entry = self.sessions.lock().remove(&handle);
        if let Some(entry) = entry {
            let _ = self
                .tmux(&["kill-session", "-t", &entry.name], "tmux kill-session")
                .await;
            for f in &entry.temp_files {
                let _ = std::fs::remove_file(f);
            }
            let _ = std::fs::remove_file(&entry.log_path);
        }
        Ok(())
    }

    async fn rebind(&self, dispatch: &Dispatch) -> Result<bool, BackendError> {
        let Some(name) = dispatch.session_name.as_deref() else {
            return Ok(false);
        };

        let output = self.tmux(&["has-session", "-t", name], "tmux has-session").await?;
        if !output.status.success() {
            return Ok(false);
        }

        self.sessions.lock().insert(
            dispatch.handle,
            SessionEntry {
                name: name.to_string(),
                temp_files: Vec::new(),
                log_path: dispatch.log_path.clone(),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
