// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Startup order: single-instance lock, store open/migrate, backend
//! construction, handle rebinding for dispatches that survived the previous
//! process, and the orphan session sweep. Shutdown stops the control
//! surface, lets the running tick finish, interrupts session dispatches,
//! and drains the reaper within the timeout.

use crate::config::Config;
use cortex_adapters::{BeadsBacklog, DispatchBackend, SubprocessBackend, TmuxBackend};
use cortex_core::{BackendKind, Clock, HealthEventType, SystemClock};
use cortex_engine::{
    run_reaper_pass, BackendRouter, Control, DispatchCtx, RateLimiter, Scheduler,
};
use cortex_store::Store;
use fs2::FileExt;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another cortexd owns the state dir (lock: {0})")]
    LockFailed(String),
    #[error("store error: {0}")]
    Store(#[from] cortex_store::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started daemon: everything the main loop needs.
pub struct Daemon {
    pub ctx: Arc<DispatchCtx>,
    pub scheduler: Arc<Scheduler>,
    pub control: Arc<Control>,
    pub tmux: Arc<TmuxBackend>,
    pub config: Config,
    // Held for the process lifetime; dropping releases the flock.
    _lock_file: std::fs::File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

/// Start the daemon: lock, open the store, rebind survivors, sweep orphans.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(config.lock_path().display().to_string()))?;
    use std::io::Write;
    let mut lock_writer = &lock_file;
    let _ = writeln!(lock_writer, "{}", std::process::id());

    let store = Arc::new(Store::open(&config.general.state_db)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let subprocess: Arc<SubprocessBackend> = Arc::new(SubprocessBackend::new(
        config.temp_dir(),
        config.dispatch_log_dir(),
    ));
    let tmux = Arc::new(TmuxBackend::new(
        config.temp_dir(),
        config.dispatch_log_dir(),
        Arc::clone(&clock),
    ));

    let limiter = Arc::new(RateLimiter::new(
        Arc::clone(&store),
        config.rate_limits(),
        Arc::clone(&clock),
    ));
    let backlog = Arc::new(BeadsBacklog::new(
        config.general.beads_bin.clone(),
        config.beads_dirs(),
    ));

    let router = BackendRouter::new(
        Arc::clone(&subprocess) as Arc<dyn DispatchBackend>,
        Arc::clone(&tmux) as Arc<dyn DispatchBackend>,
        config.routing_map(),
    );

    let ctx = Arc::new(DispatchCtx {
        store: Arc::clone(&store),
        limiter,
        backlog,
        router,
        providers: config.providers.clone(),
        clis: config.dispatch.cli.clone(),
        tiers: config.tier_map(),
        projects: config.project_entries(),
        policy: config.retry_policy(),
        settings: config.scheduler_settings(),
        clock: Arc::clone(&clock),
        shutting_down: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    });

    let rebound = rebind_survivors(&ctx).await?;
    sweep_orphan_sessions(&ctx, &tmux).await;

    ctx.store.append_health_event(
        HealthEventType::GatewayRestartSuccess,
        0,
        &format!("cortexd started, {} dispatches rebound", rebound),
        ctx.clock.now_ms(),
    )?;

    Ok(Daemon {
        scheduler: Arc::new(Scheduler::new(Arc::clone(&ctx))),
        control: Arc::new(Control::new(Arc::clone(&ctx))),
        tmux,
        ctx,
        config,
        _lock_file: lock_file,
    })
}

/// Re-attach running dispatch rows to their backends. Rows whose process or
/// session no longer exists become `unknown` for the reaper to categorize.
async fn rebind_survivors(ctx: &Arc<DispatchCtx>) -> Result<u32, LifecycleError> {
    let mut rebound = 0;
    for dispatch in ctx.store.list_running()? {
        let backend = ctx.router.by_kind(dispatch.backend);
        let alive = match backend.rebind(&dispatch).await {
            Ok(alive) => alive,
            Err(err) => {
                tracing::warn!(dispatch_id = dispatch.id, error = %err, "rebind probe failed");
                false
            }
        };
        if alive {
            tracing::info!(
                dispatch_id = dispatch.id,
                work_item = %dispatch.work_item,
                handle = dispatch.handle,
                "rebound running dispatch"
            );
            rebound += 1;
        } else {
            tracing::warn!(
                dispatch_id = dispatch.id,
                work_item = %dispatch.work_item,
                "dispatch process gone, marking unknown"
            );
            ctx.store.mark_unknown(dispatch.id)?;
        }
    }
    Ok(rebound)
}

/// Kill `ctx-` sessions from prior process instances that no store row
/// claims. Sessions with a matching running dispatch were already adopted by
/// [`rebind_survivors`].
async fn sweep_orphan_sessions(ctx: &Arc<DispatchCtx>, tmux: &Arc<TmuxBackend>) {
    let adopted: HashSet<String> = match ctx.store.list_running() {
        Ok(rows) => rows
            .into_iter()
            .filter_map(|d| d.session_name)
            .collect(),
        Err(err) => {
            tracing::warn!(error = %err, "cannot list running dispatches for orphan sweep");
            return;
        }
    };

    for session in tmux.list_cortex_sessions().await {
        if adopted.contains(&session) {
            continue;
        }
        tracing::warn!(session = %session, "killing orphaned session");
        if let Err(err) = tmux.kill_session_named(&session).await {
            tracing::warn!(session = %session, error = %err, "orphan kill failed");
        }
    }
}

/// Graceful shutdown: no new ticks, interrupt session dispatches, drain the
/// reaper within `timeout`.
pub async fn graceful_shutdown(daemon: &Daemon, timeout: Duration) {
    daemon.ctx.shutting_down.store(true, Ordering::SeqCst);

    // Session agents get a chance to wind down; subprocess agents are
    // expected to survive the parent and are picked up on the next start.
    match daemon.ctx.store.list_running() {
        Ok(rows) => {
            for dispatch in rows {
                if dispatch.backend == BackendKind::Session {
                    let backend = daemon.ctx.router.by_kind(dispatch.backend);
                    if let Err(err) = backend.interrupt(dispatch.handle).await {
                        tracing::warn!(dispatch_id = dispatch.id, error = %err, "interrupt failed");
                    }
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "cannot list dispatches for shutdown interrupt"),
    }

    let drained = tokio::time::timeout(timeout, run_reaper_pass(&daemon.ctx)).await;
    match drained {
        Ok(Ok(outcome)) => {
            tracing::info!(?outcome, "final reaper pass complete");
        }
        Ok(Err(err)) => tracing::warn!(error = %err, "final reaper pass failed"),
        Err(_) => tracing::warn!("final reaper pass timed out"),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
