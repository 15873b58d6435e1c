// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stuck-dispatch reaper.
//!
//! Each pass polls the backend for every live dispatch row and drives it to
//! a terminal state when the backend has one to report. Rows that outlive
//! `stuck_timeout` are killed and failed as `stuck_dispatch`; rows whose
//! process vanished are failed as `session_disappeared` or
//! `unknown_exit_state`. Recovery back into the backlog is the scheduler's
//! job: a failed row makes its work item eligible again once the backoff
//! window passes.

use crate::ctx::DispatchCtx;
use crate::error::DispatchError;
use cortex_adapters::{BackendStatus, DispatchBackend};
use cortex_core::{
    BackendKind, Dispatch, DispatchState, FailureCategory, HealthEventType,
};
use cortex_store::StoreError;
use std::sync::Arc;

/// Counters for one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    pub completed: u32,
    pub failed: u32,
    pub stuck: u32,
    pub vanished: u32,
}

/// Upper bound on the failure summary captured from a dispatch's output.
const SUMMARY_TAIL_CHARS: usize = 400;

/// One reaper pass over all live dispatch rows.
pub async fn run_reaper_pass(ctx: &DispatchCtx) -> Result<ReapOutcome, DispatchError> {
    let now = ctx.clock.now_ms();
    let stuck_ms = ctx.settings.stuck_timeout.as_millis() as i64;
    let mut outcome = ReapOutcome::default();

    // Materialize the rows first; no store lock is held across backend calls.
    for dispatch in ctx.store.list_running()? {
        let backend = ctx.router.by_kind(dispatch.backend);

        let status = match backend.status(dispatch.handle).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(
                    dispatch_id = dispatch.id,
                    error = %err,
                    "backend status query failed, retrying next pass"
                );
                continue;
            }
        };

        let result = match status {
            BackendStatus::Completed => {
                outcome.completed += 1;
                finalize(ctx, backend, &dispatch, DispatchState::Completed, 0, None, now).await
            }
            BackendStatus::Failed { exit_code } => {
                outcome.failed += 1;
                let finalized = finalize(
                    ctx,
                    backend,
                    &dispatch,
                    DispatchState::Failed,
                    exit_code,
                    Some(FailureCategory::NonzeroExit),
                    now,
                )
                .await;
                surface_retry_exhaustion(ctx, &dispatch, now)?;
                finalized
            }
            BackendStatus::Running => {
                if dispatch.age_ms(now) < stuck_ms {
                    continue;
                }
                outcome.stuck += 1;
                tracing::warn!(
                    dispatch_id = dispatch.id,
                    work_item = %dispatch.work_item,
                    age_ms = dispatch.age_ms(now),
                    "dispatch exceeded stuck timeout, killing"
                );
                if let Err(err) = backend.kill(dispatch.handle).await {
                    tracing::warn!(dispatch_id = dispatch.id, error = %err, "kill failed");
                }
                ctx.store.append_health_event(
                    HealthEventType::StuckDispatch,
                    dispatch.id,
                    &format!(
                        "dispatch for {} ran past the {}s stuck timeout",
                        dispatch.work_item,
                        stuck_ms / 1000
                    ),
                    now,
                )?;
                let finalized = finalize(
                    ctx,
                    backend,
                    &dispatch,
                    DispatchState::Failed,
                    -1,
                    Some(FailureCategory::StuckDispatch),
                    now,
                )
                .await;
                surface_retry_exhaustion(ctx, &dispatch, now)?;
                finalized
            }
            BackendStatus::Unknown => {
                outcome.vanished += 1;
                let (category, event_type) = match dispatch.backend {
                    BackendKind::Session => (
                        FailureCategory::SessionDisappeared,
                        HealthEventType::SessionDisappeared,
                    ),
                    BackendKind::Subprocess => (
                        FailureCategory::UnknownExitState,
                        HealthEventType::UnknownExitState,
                    ),
                };
                ctx.store.append_health_event(
                    event_type,
                    dispatch.id,
                    &format!("dispatch for {} lost its process", dispatch.work_item),
                    now,
                )?;
                let finalized = finalize(
                    ctx,
                    backend,
                    &dispatch,
                    DispatchState::Failed,
                    -1,
                    Some(category),
                    now,
                )
                .await;
                surface_retry_exhaustion(ctx, &dispatch, now)?;
                finalized
            }
        };

        if let Err(err) = result {
            match err {
                // Lost a race with cancel; the row already settled
                DispatchError::Store(StoreError::AlreadyTerminal { .. }) => {}
                DispatchError::Store(other) => return Err(other.into()),
                other => {
                    tracing::warn!(dispatch_id = dispatch.id, error = %other, "reap failed");
                }
            }
        }
    }

    Ok(outcome)
}

/// Record a terminal state, keeping a tail of the output as the failure
/// summary, then release backend resources.
async fn finalize(
    ctx: &DispatchCtx,
    backend: &Arc<dyn DispatchBackend>,
    dispatch: &Dispatch,
    state: DispatchState,
    exit_code: i32,
    category: Option<FailureCategory>,
    now: i64,
) -> Result<(), DispatchError> {
    let summary = if category.is_some() {
        output_tail(backend, dispatch.handle).await
    } else {
        None
    };

    ctx.store.mark_terminal(
        dispatch.id,
        state,
        exit_code,
        now,
        category,
        summary.as_deref(),
    )?;

    tracing::info!(
        dispatch_id = dispatch.id,
        work_item = %dispatch.work_item,
        state = %state,
        exit_code,
        "dispatch finalized"
    );

    if let Err(err) = backend.cleanup(dispatch.handle).await {
        tracing::warn!(dispatch_id = dispatch.id, error = %err, "cleanup failed");
    }
    Ok(())
}

async fn output_tail(backend: &Arc<dyn DispatchBackend>, handle: i64) -> Option<String> {
    let bytes = backend.capture_output(handle).await.ok()?;
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(&bytes);
    let tail: String = text
        .chars()
        .rev()
        .take(SUMMARY_TAIL_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    Some(tail)
}

/// When a failed dispatch has no retries left, the item will sit in the
/// backlog untouched; surface that as a health event instead of failing
/// silently.
fn surface_retry_exhaustion(
    ctx: &DispatchCtx,
    dispatch: &Dispatch,
    now: i64,
) -> Result<(), DispatchError> {
    let attempts = dispatch.retries + 1;
    let decision = ctx.policy.next_retry(attempts, dispatch.tier);
    if !decision.should_retry {
        ctx.store.append_health_event(
            HealthEventType::BeadChurnBlocked,
            dispatch.id,
            &format!(
                "work item {} exhausted {} attempts, operator action needed",
                dispatch.work_item, attempts
            ),
            now,
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
