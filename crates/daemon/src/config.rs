// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! One TOML file drives the whole process. Durations accept humane strings
//! ("30s", "45m"). Validation runs once at startup; a bad config is a
//! non-zero exit, never a half-started daemon.

use cortex_core::{
    parse_duration, BackendKind, CliConfig, PromptMode, ProviderConfig, RetryPolicy, Tier,
};
use cortex_engine::{ProjectEntry, RateLimits, SchedulerSettings, TierMap};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn de_duration<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(d)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// `[general]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(deserialize_with = "de_duration", default = "default_tick_interval")]
    pub tick_interval: Duration,
    #[serde(default = "default_max_per_tick")]
    pub max_per_tick: u32,
    #[serde(deserialize_with = "de_duration", default = "default_stuck_timeout")]
    pub stuck_timeout: Duration,
    #[serde(deserialize_with = "de_duration", default = "default_backoff_base")]
    pub retry_backoff_base: Duration,
    #[serde(deserialize_with = "de_duration", default = "default_max_delay")]
    pub retry_max_delay: Duration,
    #[serde(default = "default_backoff_factor")]
    pub retry_backoff_factor: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_escalate_after")]
    pub escalate_after: u32,
    #[serde(deserialize_with = "de_duration", default = "default_cooldown")]
    pub dispatch_cooldown: Duration,
    pub state_db: PathBuf,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_beads_bin")]
    pub beads_bin: String,
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_max_per_tick() -> u32 {
    3
}
fn default_stuck_timeout() -> Duration {
    Duration::from_secs(45 * 60)
}
fn default_backoff_base() -> Duration {
    Duration::from_secs(60)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(3600)
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_escalate_after() -> u32 {
    2
}
fn default_cooldown() -> Duration {
    Duration::from_secs(60)
}
fn default_listen_addr() -> String {
    "127.0.0.1:7171".to_string()
}
fn default_beads_bin() -> String {
    "bd".to_string()
}

/// `[ratelimits]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    pub window_5h_cap: u32,
    pub weekly_cap: u32,
    #[serde(default = "default_headroom")]
    pub weekly_headroom_pct: f64,
}

fn default_headroom() -> f64 {
    0.85
}

/// `[projects.<name>]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub workspace: PathBuf,
    pub beads_dir: PathBuf,
    #[serde(default)]
    pub matrix_room: Option<String>,
    /// Lower wins in the global merge order.
    #[serde(default = "default_project_priority")]
    pub priority: u32,
}

fn default_true() -> bool {
    true
}
fn default_project_priority() -> u32 {
    100
}

/// `[tiers]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TiersConfig {
    #[serde(default)]
    pub fast: Vec<String>,
    #[serde(default)]
    pub balanced: Vec<String>,
    #[serde(default)]
    pub premium: Vec<String>,
}

/// `[dispatch.routing]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    #[serde(default = "default_backend")]
    pub fast_backend: BackendKind,
    #[serde(default = "default_backend")]
    pub balanced_backend: BackendKind,
    #[serde(default = "default_backend")]
    pub premium_backend: BackendKind,
}

fn default_backend() -> BackendKind {
    BackendKind::Subprocess
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fast_backend: BackendKind::Subprocess,
            balanced_backend: BackendKind::Subprocess,
            premium_backend: BackendKind::Subprocess,
        }
    }
}

/// `[dispatch]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cli: HashMap<String, CliConfig>,
}

/// Whole-file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub general: GeneralConfig,
    pub ratelimits: RateLimitConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub projects: HashMap<String, ProjectConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-reference checks that make a config usable, not just parseable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.retry_backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "general.retry_backoff_factor must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ratelimits.weekly_headroom_pct) {
            return Err(ConfigError::Invalid(
                "ratelimits.weekly_headroom_pct must be within [0, 1]".into(),
            ));
        }

        for (tier, names) in [
            (Tier::Fast, &self.tiers.fast),
            (Tier::Balanced, &self.tiers.balanced),
            (Tier::Premium, &self.tiers.premium),
        ] {
            for name in names {
                let Some(_provider) = self.providers.get(name) else {
                    return Err(ConfigError::Invalid(format!(
                        "tiers.{} references unknown provider {}",
                        tier, name
                    )));
                };
                let Some(cli) = self.dispatch.cli.get(name) else {
                    return Err(ConfigError::Invalid(format!(
                        "provider {} has no dispatch.cli.{} entry",
                        name, name
                    )));
                };
                // Inline prompts cannot cross the session backend
                if self.backend_for(tier) == BackendKind::Session
                    && cli.prompt_mode == PromptMode::Arg
                {
                    return Err(ConfigError::Invalid(format!(
                        "dispatch.cli.{} uses prompt_mode = \"arg\" but tier {} routes to the \
                         session backend; use \"file\" or \"stdin\"",
                        name, tier
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn backend_for(&self, tier: Tier) -> BackendKind {
        match tier {
            Tier::Fast => self.dispatch.routing.fast_backend,
            Tier::Balanced => self.dispatch.routing.balanced_backend,
            Tier::Premium => self.dispatch.routing.premium_backend,
        }
    }

    /// Directory holding everything the daemon writes: the store file, the
    /// per-dispatch logs, temp files, lock, and daemon log.
    pub fn state_dir(&self) -> PathBuf {
        self.general
            .state_db
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("cortexd.lock")
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.state_dir().join("cortexd.log")
    }

    pub fn dispatch_log_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            window_5h_cap: self.ratelimits.window_5h_cap,
            weekly_cap: self.ratelimits.weekly_cap,
            weekly_headroom_pct: self.ratelimits.weekly_headroom_pct,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: self.general.retry_backoff_base,
            max_delay: self.general.retry_max_delay,
            factor: self.general.retry_backoff_factor,
            max_retries: self.general.max_retries,
            escalate_after: self.general.escalate_after,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            max_per_tick: self.general.max_per_tick,
            default_tier: Tier::Balanced,
            stuck_timeout: self.general.stuck_timeout,
            dispatch_cooldown: self.general.dispatch_cooldown,
        }
    }

    pub fn tier_map(&self) -> TierMap {
        TierMap {
            fast: self.tiers.fast.clone(),
            balanced: self.tiers.balanced.clone(),
            premium: self.tiers.premium.clone(),
        }
    }

    pub fn routing_map(&self) -> HashMap<Tier, BackendKind> {
        [Tier::Fast, Tier::Balanced, Tier::Premium]
            .into_iter()
            .map(|tier| (tier, self.backend_for(tier)))
            .collect()
    }

    pub fn project_entries(&self) -> Vec<ProjectEntry> {
        self.projects
            .iter()
            .map(|(name, p)| ProjectEntry {
                name: name.clone(),
                priority: p.priority,
                workspace: p.workspace.clone(),
                enabled: p.enabled,
            })
            .collect()
    }

    pub fn beads_dirs(&self) -> HashMap<String, PathBuf> {
        self.projects
            .iter()
            .map(|(name, p)| (name.clone(), p.beads_dir.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
