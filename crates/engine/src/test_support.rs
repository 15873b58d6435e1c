// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake-backed dispatch harness for tests

use crate::ctx::{BackendRouter, DispatchCtx, ProjectEntry, SchedulerSettings, TierMap};
use crate::ratelimit::{RateLimiter, RateLimits};
use cortex_adapters::{FakeBacklog, FakeBackend};
use cortex_core::{
    BackendKind, CliConfig, FakeClock, ItemType, PromptMode, ProviderConfig, RetryPolicy, Tier,
    WorkItem,
};
use cortex_store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub store: Arc<Store>,
    pub clock: Arc<FakeClock>,
    pub subprocess: FakeBackend,
    pub session: FakeBackend,
    pub backlog: FakeBacklog,
    pub ctx: Arc<DispatchCtx>,
}

pub struct HarnessConfig {
    pub limits: RateLimits,
    pub settings: SchedulerSettings,
    pub policy: RetryPolicy,
    pub providers: HashMap<String, ProviderConfig>,
    pub tiers: TierMap,
    pub projects: Vec<ProjectEntry>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                model: "mini-1".into(),
                tier: Tier::Fast,
                authed: false,
            },
        );
        providers.insert(
            "sonnet".to_string(),
            ProviderConfig {
                model: "sonnet-4".into(),
                tier: Tier::Balanced,
                authed: true,
            },
        );
        providers.insert(
            "opus".to_string(),
            ProviderConfig {
                model: "opus-4".into(),
                tier: Tier::Premium,
                authed: true,
            },
        );

        Self {
            limits: RateLimits {
                window_5h_cap: 100,
                weekly_cap: 1000,
                weekly_headroom_pct: 0.85,
            },
            settings: SchedulerSettings {
                max_per_tick: 5,
                default_tier: Tier::Balanced,
                stuck_timeout: Duration::from_secs(45 * 60),
                dispatch_cooldown: Duration::from_secs(60),
            },
            policy: RetryPolicy {
                base: Duration::from_secs(60),
                max_delay: Duration::from_secs(3600),
                factor: 2.0,
                max_retries: 3,
                escalate_after: 2,
            },
            providers,
            tiers: TierMap {
                fast: vec!["local".to_string()],
                balanced: vec!["sonnet".to_string()],
                premium: vec!["opus".to_string()],
            },
            projects: vec![ProjectEntry {
                name: "alpha".to_string(),
                priority: 0,
                workspace: PathBuf::from("/tmp/alpha"),
                enabled: true,
            }],
        }
    }
}

pub fn harness() -> Harness {
    harness_with(HarnessConfig::default())
}

pub fn harness_with(config: HarnessConfig) -> Harness {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let clock = Arc::new(FakeClock::new());
    let subprocess = FakeBackend::new(BackendKind::Subprocess);
    let session = FakeBackend::new(BackendKind::Session);
    let backlog = FakeBacklog::new();

    let limiter = Arc::new(RateLimiter::new(
        Arc::clone(&store),
        config.limits,
        clock.clone() as Arc<dyn cortex_core::Clock>,
    ));

    // Everything routes to the subprocess fake unless a test remaps tiers
    let mut routing = HashMap::new();
    routing.insert(Tier::Fast, BackendKind::Subprocess);
    routing.insert(Tier::Balanced, BackendKind::Subprocess);
    routing.insert(Tier::Premium, BackendKind::Subprocess);

    let clis = config
        .providers
        .keys()
        .map(|name| {
            (
                name.clone(),
                CliConfig {
                    cmd: "agent".into(),
                    args: vec!["-p".into(), "{prompt}".into()],
                    prompt_mode: PromptMode::Arg,
                    model_flag: Some("--model={model}".into()),
                    approval_flags: vec![],
                },
            )
        })
        .collect();

    let ctx = Arc::new(DispatchCtx {
        store: Arc::clone(&store),
        limiter,
        backlog: Arc::new(backlog.clone()),
        router: BackendRouter::new(
            Arc::new(subprocess.clone()),
            Arc::new(session.clone()),
            routing,
        ),
        providers: config.providers,
        clis,
        tiers: config.tiers,
        projects: config.projects,
        policy: config.policy,
        settings: config.settings,
        clock: clock.clone() as Arc<dyn cortex_core::Clock>,
        shutting_down: Arc::new(AtomicBool::new(false)),
    });

    Harness {
        store,
        clock,
        subprocess,
        session,
        backlog,
        ctx,
    }
}

pub fn item(id: &str, agent: &str, priority: u32) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        item_type: ItemType::Task,
        priority,
        agent: agent.to_string(),
        depends_on: vec![],
        title: format!("work on {}", id),
        created_at_ms: 0,
    }
}
