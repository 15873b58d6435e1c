// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic exit-state capture through the real subprocess backend.

use crate::prelude::{SPEC_POLL_INTERVAL_MS, SPEC_WAIT_MAX_MS};
use cortex_adapters::{poll_until, BackendStatus, DispatchBackend, LaunchSpec, SubprocessBackend};
use cortex_core::{CliConfig, PromptMode};
use std::time::Duration;

fn spec(dir: &std::path::Path, cmd: &str, args: &[&str]) -> LaunchSpec {
    LaunchSpec {
        work_item: "cx-exit".into(),
        project: "specs".into(),
        agent: "coder".into(),
        cli: CliConfig {
            cmd: cmd.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            prompt_mode: PromptMode::Arg,
            model_flag: None,
            approval_flags: vec![],
        },
        model: String::new(),
        prompt: "observe the exit code".into(),
        work_dir: dir.to_path_buf(),
    }
}

#[tokio::test]
async fn exit_code_42_is_captured_within_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SubprocessBackend::new(dir.path().join("tmp"), dir.path().join("logs"));

    let launched = backend
        .dispatch(spec(dir.path(), "sh", &["-c", "sleep 0.2; exit 42"]))
        .await
        .unwrap();

    // Poll every 50ms with a 5s deadline; never a fixed sleep
    let status = poll_until(
        Duration::from_millis(SPEC_WAIT_MAX_MS),
        Duration::from_millis(SPEC_POLL_INTERVAL_MS),
        || async {
            let status = backend.status(launched.handle).await.ok()?;
            status.is_terminal().then_some(status)
        },
    )
    .await;

    assert_eq!(status, Some(BackendStatus::Failed { exit_code: 42 }));

    // After the exit is observed the state never flaps back to running
    for _ in 0..5 {
        assert_eq!(
            backend.status(launched.handle).await.unwrap(),
            BackendStatus::Failed { exit_code: 42 }
        );
    }
}

#[tokio::test]
async fn status_never_synthesizes_terminal_before_exit() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SubprocessBackend::new(dir.path().join("tmp"), dir.path().join("logs"));

    let launched = backend
        .dispatch(spec(dir.path(), "sleep", &["0.3"]))
        .await
        .unwrap();

    // While the child is alive, the status is running (never a guessed exit)
    let early = backend.status(launched.handle).await.unwrap();
    assert!(matches!(
        early,
        BackendStatus::Running | BackendStatus::Completed
    ));

    let status = poll_until(
        Duration::from_millis(SPEC_WAIT_MAX_MS),
        Duration::from_millis(SPEC_POLL_INTERVAL_MS),
        || async {
            let status = backend.status(launched.handle).await.ok()?;
            status.is_terminal().then_some(status)
        },
    )
    .await;
    assert_eq!(status, Some(BackendStatus::Completed));
}
