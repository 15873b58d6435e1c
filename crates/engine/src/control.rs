// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control surface operations: pause/resume, cancel, retry, status.
//!
//! Everything here is serialized through the store; the HTTP layer is a
//! thin shell around this module.

use crate::ctx::DispatchCtx;
use crate::error::DispatchError;
use cortex_adapters::LaunchSpec;
use cortex_core::{
    Dispatch, DispatchState, FailureCategory, HealthEvent, SchedulerRunState,
};
use cortex_store::NewDispatch;
use std::sync::Arc;
use thiserror::Error;

/// Errors from control operations, mapped onto HTTP statuses by the caller.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("dispatch {0} not found")]
    NotFound(i64),
    #[error("dispatch {id} is {state}, expected a terminal state")]
    NotTerminal { id: i64, state: DispatchState },
    #[error("provider {0} is no longer configured")]
    ProviderGone(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<cortex_store::StoreError> for ControlError {
    fn from(err: cortex_store::StoreError) -> Self {
        ControlError::Dispatch(err.into())
    }
}

/// Aggregate status for `GET /status`.
#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub running_count: u32,
    pub recent_failures: u32,
    pub weekly_usage_pct: f64,
}

/// Health snapshot for `GET /health`.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub events: Vec<HealthEvent>,
}

/// Window over which `/status` counts recent failures.
const RECENT_FAILURE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// How many health events `/health` returns, and the set `healthy` is
/// judged over.
const HEALTH_EVENT_LIMIT: u32 = 50;

pub struct Control {
    ctx: Arc<DispatchCtx>,
}

impl Control {
    pub fn new(ctx: Arc<DispatchCtx>) -> Self {
        Self { ctx }
    }

    /// Pause the scheduler. Idempotent.
    pub fn pause(&self) -> Result<(), ControlError> {
        let now = self.ctx.clock.now_ms();
        self.ctx
            .store
            .set_scheduler_state(SchedulerRunState::Paused, now)?;
        tracing::info!("scheduler paused");
        Ok(())
    }

    /// Resume the scheduler. Idempotent; after a restart this restores the
    /// persisted state rather than inventing one.
    pub fn resume(&self) -> Result<(), ControlError> {
        let now = self.ctx.clock.now_ms();
        self.ctx
            .store
            .set_scheduler_state(SchedulerRunState::Running, now)?;
        tracing::info!("scheduler resumed");
        Ok(())
    }

    pub fn scheduler_state(&self) -> Result<(SchedulerRunState, i64), ControlError> {
        Ok(self.ctx.store.get_scheduler_state()?)
    }

    /// Cancel a running dispatch: kill the process, then record `cancelled`.
    /// Returns `false` (a no-op) when the dispatch is not running.
    pub async fn cancel(&self, id: i64) -> Result<bool, ControlError> {
        let dispatch = self
            .ctx
            .store
            .get_dispatch(id)?
            .ok_or(ControlError::NotFound(id))?;
        if dispatch.state != DispatchState::Running {
            return Ok(false);
        }

        let backend = self.ctx.router.by_kind(dispatch.backend);
        backend.kill(dispatch.handle).await.map_err(DispatchError::from)?;

        let now = self.ctx.clock.now_ms();
        match self.ctx.store.mark_terminal(
            id,
            DispatchState::Cancelled,
            -1,
            now,
            Some(FailureCategory::Cancelled),
            Some("cancelled via control surface"),
        ) {
            Ok(()) => {}
            // The reaper beat us to a terminal state: exactly one transition
            // happened, which is what cancel guarantees
            Err(cortex_store::StoreError::AlreadyTerminal { .. }) => return Ok(false),
            Err(err) => return Err(err.into()),
        }

        if let Err(err) = backend.cleanup(dispatch.handle).await {
            tracing::warn!(dispatch_id = id, error = %err, "cleanup after cancel failed");
        }
        tracing::info!(dispatch_id = id, "dispatch cancelled");
        Ok(true)
    }

    /// Re-run a terminal dispatch as a fresh record with `retries + 1`. The
    /// original row keeps its terminal state.
    pub async fn retry(&self, id: i64) -> Result<i64, ControlError> {
        let original = self
            .ctx
            .store
            .get_dispatch(id)?
            .ok_or(ControlError::NotFound(id))?;
        if !original.state.is_terminal() {
            return Err(ControlError::NotTerminal {
                id,
                state: original.state,
            });
        }

        let config = self
            .ctx
            .providers
            .get(&original.provider)
            .ok_or_else(|| ControlError::ProviderGone(original.provider.clone()))?;
        let cli = self
            .ctx
            .clis
            .get(&original.provider)
            .ok_or_else(|| ControlError::ProviderGone(original.provider.clone()))?
            .clone();

        let spec = LaunchSpec {
            work_item: original.work_item.clone(),
            project: original.project.clone(),
            agent: original.agent.clone(),
            cli,
            model: config.model.clone(),
            prompt: original.prompt.clone(),
            work_dir: original.work_dir.clone(),
        };

        let (kind, backend) = self.ctx.router.for_tier(original.tier);
        let launched = backend.dispatch(spec).await.map_err(DispatchError::from)?;

        let now = self.ctx.clock.now_ms();
        let new_id = self.ctx.store.record_dispatch(&NewDispatch {
            work_item: original.work_item.clone(),
            project: original.project.clone(),
            agent: original.agent.clone(),
            provider: original.provider.clone(),
            tier: original.tier,
            backend: kind,
            handle: launched.handle,
            session_name: launched.session_name,
            work_dir: original.work_dir.clone(),
            log_path: launched.log_path,
            prompt: original.prompt.clone(),
            retries: original.retries + 1,
            dispatched_at_ms: now,
        })?;

        tracing::info!(
            dispatch_id = new_id,
            original_id = id,
            work_item = %original.work_item,
            "dispatch retried"
        );
        Ok(new_id)
    }

    /// History for a work item, oldest attempt first.
    pub fn dispatch_history(&self, work_item: &str) -> Result<Vec<Dispatch>, ControlError> {
        Ok(self.ctx.store.dispatches_for_item(work_item)?)
    }

    pub fn status_summary(&self) -> Result<StatusSummary, ControlError> {
        let now = self.ctx.clock.now_ms();
        Ok(StatusSummary {
            running_count: self.ctx.store.count_running()?,
            recent_failures: self
                .ctx
                .store
                .count_recent_failures(now - RECENT_FAILURE_WINDOW_MS)?,
            weekly_usage_pct: self.ctx.limiter.weekly_usage_pct()?,
        })
    }

    /// Health is judged over the recent event window: critical event types
    /// flip `healthy` to false.
    pub fn health(&self) -> Result<HealthSnapshot, ControlError> {
        let events = self.ctx.store.recent_health_events(HEALTH_EVENT_LIMIT)?;
        let healthy = !events.iter().any(|e| {
            matches!(
                e.event_type,
                cortex_core::HealthEventType::GatewayCritical
                    | cortex_core::HealthEventType::BeadChurnBlocked
            )
        });
        Ok(HealthSnapshot { healthy, events })
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
