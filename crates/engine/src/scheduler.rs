// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tick: backlog state in, bounded concurrent dispatches out.
//!
//! Ticks are mutually exclusive; a tick arriving while another is in
//! progress is skipped, not queued. Dispatches started by a tick run
//! concurrently with later ticks.

use crate::ctx::DispatchCtx;
use crate::error::DispatchError;
use crate::ratelimit::PickedProvider;
use cortex_adapters::{BackendError, LaunchSpec};
use cortex_core::{
    DispatchState, FailureCategory, HealthEventType, Tier, WorkItem,
};
use cortex_store::NewDispatch;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub dispatched: u32,
    pub rate_limited: u32,
    pub no_provider: u32,
    pub failed: u32,
    pub paused: bool,
}

/// A work item that survived the selection filters, with its retry context.
struct Candidate {
    project: String,
    project_priority: u32,
    workspace: PathBuf,
    item: WorkItem,
    retries: u32,
    tier: Tier,
}

/// Serialized tick driver.
pub struct Scheduler {
    ctx: Arc<DispatchCtx>,
    tick_lock: tokio::sync::Mutex<()>,
    /// Tracks whether the weekly headroom warning has already been raised,
    /// so the crossing is reported once, not every tick.
    headroom_warned: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    pub fn new(ctx: Arc<DispatchCtx>) -> Self {
        Self {
            ctx,
            tick_lock: tokio::sync::Mutex::new(()),
            headroom_warned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Run one tick. Returns `None` when another tick is already in
    /// progress.
    pub async fn tick(&self) -> Result<Option<TickOutcome>, DispatchError> {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            tracing::debug!("tick already in progress, skipping");
            return Ok(None);
        };
        self.run_tick().await.map(Some)
    }

    async fn run_tick(&self) -> Result<TickOutcome, DispatchError> {
        let ctx = &self.ctx;
        let mut outcome = TickOutcome::default();

        let (state, _) = ctx.store.get_scheduler_state()?;
        if state == cortex_core::SchedulerRunState::Paused {
            outcome.paused = true;
            return Ok(outcome);
        }

        let now = ctx.clock.now_ms();
        let live = ctx.store.list_running()?;
        let mut busy_agents: HashSet<String> = live.iter().map(|d| d.agent.clone()).collect();
        let mut live_items: HashSet<(String, String)> = live
            .iter()
            .map(|d| (d.work_item.clone(), d.project.clone()))
            .collect();

        let mut candidates = self.select_candidates(now, &busy_agents, &live_items).await?;
        candidates.sort_by(|a, b| {
            a.item
                .order_key(a.project_priority)
                .cmp(&b.item.order_key(b.project_priority))
        });
        candidates.truncate(ctx.settings.max_per_tick as usize);

        for candidate in candidates {
            if ctx.shutting_down.load(Ordering::SeqCst) {
                tracing::info!("shutdown requested, aborting tick");
                break;
            }
            // Re-check against dispatches started earlier in this tick
            if busy_agents.contains(&candidate.item.agent)
                || live_items.contains(&(candidate.item.id.clone(), candidate.project.clone()))
            {
                continue;
            }

            match self.dispatch_one(&candidate, now, &mut outcome).await {
                Ok(true) => {
                    busy_agents.insert(candidate.item.agent.clone());
                    live_items.insert((candidate.item.id.clone(), candidate.project.clone()));
                    self.check_headroom(now)?;
                }
                Ok(false) => {}
                // Store corruption aborts the tick; everything else already
                // counted against the item
                Err(err @ DispatchError::Store(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        work_item = %candidate.item.id,
                        project = %candidate.project,
                        error = %err,
                        "work item dispatch errored"
                    );
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Gather ready items across enabled projects, applying the exclusion
    /// filters. A failing backlog read skips that project only.
    async fn select_candidates(
        &self,
        now: i64,
        busy_agents: &HashSet<String>,
        live_items: &HashSet<(String, String)>,
    ) -> Result<Vec<Candidate>, DispatchError> {
        let ctx = &self.ctx;
        let mut projects: Vec<_> = ctx.projects.iter().filter(|p| p.enabled).collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        let cooldown_ms = ctx.settings.dispatch_cooldown.as_millis() as i64;
        let mut candidates = Vec::new();

        for project in projects {
            let items = match ctx.backlog.list_ready(&project.name).await {
                Ok(items) => items,
                Err(err) => {
                    tracing::warn!(project = %project.name, error = %err, "backlog read failed");
                    continue;
                }
            };

            for item in items {
                if item.item_type.is_epic() {
                    continue;
                }
                if live_items.contains(&(item.id.clone(), project.name.clone())) {
                    continue;
                }
                if busy_agents.contains(&item.agent) {
                    continue;
                }

                let (retries, tier) = match ctx.store.last_attempt(&item.id, &project.name)? {
                    None => (0, ctx.settings.default_tier),
                    Some(last) => {
                        if now.saturating_sub(last.dispatched_at_ms) < cooldown_ms {
                            continue;
                        }
                        if last.state == DispatchState::Failed {
                            let attempts = last.retries + 1;
                            let decision = ctx.policy.next_retry(attempts, last.tier);
                            if !decision.should_retry {
                                continue;
                            }
                            if !ctx.policy.should_retry_now(last.dispatched_at_ms, attempts, now) {
                                continue;
                            }
                            (attempts, decision.tier)
                        } else {
                            // Item re-opened after a completed or cancelled
                            // attempt: a fresh retry sequence
                            (0, ctx.settings.default_tier)
                        }
                    }
                };

                candidates.push(Candidate {
                    project: project.name.clone(),
                    project_priority: project.priority,
                    workspace: project.workspace.clone(),
                    item,
                    retries,
                    tier,
                });
            }
        }
        Ok(candidates)
    }

    /// Reserve a provider and launch one work item. `Ok(true)` means a
    /// dispatch record now exists.
    async fn dispatch_one(
        &self,
        candidate: &Candidate,
        now: i64,
        outcome: &mut TickOutcome,
    ) -> Result<bool, DispatchError> {
        let ctx = &self.ctx;
        let item = &candidate.item;
        let exclude_models = HashSet::new();

        let mut tier = candidate.tier;
        let picked = loop {
            match ctx.limiter.pick_and_reserve(
                ctx.tiers.candidates(tier),
                &ctx.providers,
                &exclude_models,
                &item.agent,
                &item.id,
            ) {
                Ok(Some(picked)) => break picked,
                Ok(None) => {
                    // Downgrade once; rate limits never trigger a downgrade
                    // because all authed providers share the same caps.
                    let lower = tier.downgrade();
                    if lower == tier {
                        tracing::debug!(work_item = %item.id, tier = %candidate.tier, "no provider available");
                        outcome.no_provider += 1;
                        return Ok(false);
                    }
                    tier = lower;
                }
                Err(DispatchError::RateLimited { window, count, cap }) => {
                    tracing::debug!(
                        work_item = %item.id,
                        %window,
                        count,
                        cap,
                        "rate limited, skipping this tick"
                    );
                    outcome.rate_limited += 1;
                    return Ok(false);
                }
                Err(other) => return Err(other),
            }
        };

        let PickedProvider {
            name: provider,
            config,
            reservation,
        } = picked;

        let Some(cli) = ctx.clis.get(&provider).cloned() else {
            if let Some(reservation) = reservation {
                reservation.release()?;
            }
            ctx.store.append_health_event(
                HealthEventType::GatewayCritical,
                0,
                &format!("provider {} has no dispatch.cli entry", provider),
                now,
            )?;
            outcome.failed += 1;
            return Ok(false);
        };

        let spec = LaunchSpec {
            work_item: item.id.clone(),
            project: candidate.project.clone(),
            agent: item.agent.clone(),
            cli,
            model: config.model.clone(),
            prompt: render_prompt(item),
            work_dir: candidate.workspace.clone(),
        };

        let (kind, backend) = ctx.router.for_tier(tier);
        match backend.dispatch(spec).await {
            Ok(launched) => {
                let record = NewDispatch {
                    work_item: item.id.clone(),
                    project: candidate.project.clone(),
                    agent: item.agent.clone(),
                    provider,
                    tier,
                    backend: kind,
                    handle: launched.handle,
                    session_name: launched.session_name,
                    work_dir: candidate.workspace.clone(),
                    log_path: launched.log_path,
                    prompt: render_prompt(item),
                    retries: candidate.retries,
                    dispatched_at_ms: now,
                };
                match ctx.store.record_dispatch(&record) {
                    Ok(id) => {
                        if let Some(reservation) = reservation {
                            reservation.commit();
                        }
                        tracing::info!(
                            dispatch_id = id,
                            work_item = %item.id,
                            project = %candidate.project,
                            agent = %item.agent,
                            provider = %record.provider,
                            tier = %tier,
                            handle = launched.handle,
                            "dispatched"
                        );
                        outcome.dispatched += 1;
                        Ok(true)
                    }
                    Err(err) => {
                        // The process is already running but we cannot track
                        // it; stop it rather than leak an untracked agent.
                        let _ = backend.kill(launched.handle).await;
                        let _ = backend.cleanup(launched.handle).await;
                        if let Some(reservation) = reservation {
                            let _ = reservation.release();
                        }
                        Err(err.into())
                    }
                }
            }
            Err(err) => {
                if let Some(reservation) = reservation {
                    reservation.release()?;
                }
                self.record_failed_launch(candidate, &provider, tier, kind, now, &err)?;
                outcome.failed += 1;
                Ok(false)
            }
        }
    }

    /// A launch that never produced a process still counts as an attempt:
    /// record a terminal `dispatch_failed` row and a health event.
    fn record_failed_launch(
        &self,
        candidate: &Candidate,
        provider: &str,
        tier: Tier,
        kind: cortex_core::BackendKind,
        now: i64,
        err: &BackendError,
    ) -> Result<(), DispatchError> {
        let ctx = &self.ctx;
        let item = &candidate.item;

        let event_type = if err.is_config_error() {
            HealthEventType::GatewayCritical
        } else {
            HealthEventType::DispatchFailed
        };

        let record = NewDispatch {
            work_item: item.id.clone(),
            project: candidate.project.clone(),
            agent: item.agent.clone(),
            provider: provider.to_string(),
            tier,
            backend: kind,
            handle: 0,
            session_name: None,
            work_dir: candidate.workspace.clone(),
            log_path: PathBuf::new(),
            prompt: render_prompt(item),
            retries: candidate.retries,
            dispatched_at_ms: now,
        };
        let id = ctx.store.record_dispatch(&record)?;
        ctx.store.mark_terminal(
            id,
            DispatchState::Failed,
            -1,
            now,
            Some(FailureCategory::DispatchFailed),
            Some(&err.to_string()),
        )?;
        ctx.store
            .append_health_event(event_type, id, &err.to_string(), now)?;

        tracing::warn!(
            dispatch_id = id,
            work_item = %item.id,
            provider,
            error = %err,
            "backend could not start dispatch"
        );
        Ok(())
    }
}

impl Scheduler {
    /// Raise a health event the first time weekly usage crosses the
    /// headroom threshold; re-arm once usage drops back below it.
    fn check_headroom(&self, now: i64) -> Result<(), DispatchError> {
        let warned = self.headroom_warned.load(Ordering::SeqCst);
        let over = self.ctx.limiter.headroom_warning()?;
        if over && !warned {
            self.headroom_warned.store(true, Ordering::SeqCst);
            let pct = self.ctx.limiter.weekly_usage_pct()?;
            self.ctx.store.append_health_event(
                HealthEventType::GatewayCritical,
                0,
                &format!("weekly provider usage at {:.0}% of cap", pct),
                now,
            )?;
        } else if !over && warned {
            self.headroom_warned.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// The prompt handed to the agent CLI. Prompt construction proper lives
/// with the agent definitions; the scheduler only states the work item.
fn render_prompt(item: &WorkItem) -> String {
    if item.title.is_empty() {
        item.id.clone()
    } else {
        format!("{}: {}", item.id, item.title)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
