// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-scoped dispatch context.
//!
//! Everything the scheduler, reaper, and control surface need is
//! constructed once at startup and passed down explicitly; there are no
//! ambient singletons, and pause state lives in the store.

use crate::ratelimit::RateLimiter;
use cortex_adapters::{Backlog, DispatchBackend};
use cortex_core::{BackendKind, CliConfig, Clock, ProviderConfig, RetryPolicy, Tier};
use cortex_store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Ordered provider candidate lists per tier (`tiers.*` configuration).
#[derive(Debug, Clone, Default)]
pub struct TierMap {
    pub fast: Vec<String>,
    pub balanced: Vec<String>,
    pub premium: Vec<String>,
}

impl TierMap {
    pub fn candidates(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Balanced => &self.balanced,
            Tier::Premium => &self.premium,
        }
    }
}

/// Tier → backend resolution (`dispatch.routing.*`). A configuration
/// lookup, never an environment probe.
pub struct BackendRouter {
    subprocess: Arc<dyn DispatchBackend>,
    session: Arc<dyn DispatchBackend>,
    routing: HashMap<Tier, BackendKind>,
}

impl BackendRouter {
    pub fn new(
        subprocess: Arc<dyn DispatchBackend>,
        session: Arc<dyn DispatchBackend>,
        routing: HashMap<Tier, BackendKind>,
    ) -> Self {
        Self {
            subprocess,
            session,
            routing,
        }
    }

    /// The backend driving a tier. Unrouted tiers fall back to subprocess.
    pub fn for_tier(&self, tier: Tier) -> (BackendKind, &Arc<dyn DispatchBackend>) {
        let kind = self
            .routing
            .get(&tier)
            .copied()
            .unwrap_or(BackendKind::Subprocess);
        (kind, self.by_kind(kind))
    }

    pub fn by_kind(&self, kind: BackendKind) -> &Arc<dyn DispatchBackend> {
        match kind {
            BackendKind::Subprocess => &self.subprocess,
            BackendKind::Session => &self.session,
        }
    }
}

/// One configured project.
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    pub name: String,
    /// Lower value wins in the global merge order.
    pub priority: u32,
    pub workspace: PathBuf,
    pub enabled: bool,
}

/// Scheduler knobs from `general.*` configuration.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_per_tick: u32,
    pub default_tier: Tier,
    pub stuck_timeout: Duration,
    /// Minimum inter-attempt spacing per work item, applied on top of the
    /// retry backoff.
    pub dispatch_cooldown: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_per_tick: 3,
            default_tier: Tier::Balanced,
            stuck_timeout: Duration::from_secs(45 * 60),
            dispatch_cooldown: Duration::from_secs(60),
        }
    }
}

/// Shared handles for one daemon process.
pub struct DispatchCtx {
    pub store: Arc<Store>,
    pub limiter: Arc<RateLimiter>,
    pub backlog: Arc<dyn Backlog>,
    pub router: BackendRouter,
    pub providers: HashMap<String, ProviderConfig>,
    pub clis: HashMap<String, CliConfig>,
    pub tiers: TierMap,
    pub projects: Vec<ProjectEntry>,
    pub policy: RetryPolicy,
    pub settings: SchedulerSettings,
    pub clock: Arc<dyn Clock>,
    /// Set during graceful shutdown: the per-item loop aborts at the next
    /// iteration and releases any un-dispatched reservation.
    pub shutting_down: Arc<AtomicBool>,
}

#[cfg(test)]
#[path = "ctx_tests.rs"]
mod tests;
