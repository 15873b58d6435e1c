// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global rate limiter over provider-usage rows.
//!
//! All authed providers share two rolling windows (5 hours and 7 days).
//! `reserve` is the only admission path: it re-checks both invariants
//! around the insert under a process-wide mutex, so concurrent callers can
//! never push a window past its cap.

use crate::error::DispatchError;
use cortex_core::{Clock, ProviderConfig};
use cortex_store::{Store, StoreError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which rolling window bound a rate-limit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    FiveHour,
    Weekly,
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateWindow::FiveHour => f.write_str("5h"),
            RateWindow::Weekly => f.write_str("weekly"),
        }
    }
}

/// Global caps from `ratelimits.*` configuration.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub window_5h_cap: u32,
    pub weekly_cap: u32,
    /// Fraction of the weekly cap at which the headroom warning trips.
    pub weekly_headroom_pct: f64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            window_5h_cap: 40,
            weekly_cap: 400,
            weekly_headroom_pct: 0.85,
        }
    }
}

/// One-shot release guard for a reserved usage row.
///
/// The caller must call [`Reservation::release`] iff the dispatch fails
/// before the process is spawned, and [`Reservation::commit`] once the
/// process is running.
#[must_use = "a reservation must be committed or released"]
#[derive(Debug)]
pub struct Reservation {
    store: Arc<Store>,
    usage_id: i64,
}

impl Reservation {
    pub fn usage_id(&self) -> i64 {
        self.usage_id
    }

    /// Roll the reservation back, freeing the slot.
    pub fn release(self) -> Result<(), StoreError> {
        self.store.delete_provider_usage(self.usage_id)
    }

    /// Keep the usage row: the dispatch is running.
    pub fn commit(self) {}
}

/// A provider picked by [`RateLimiter::pick_and_reserve`]. Unauthed
/// providers carry no reservation because they bypass the global windows.
#[derive(Debug)]
pub struct PickedProvider {
    pub name: String,
    pub config: ProviderConfig,
    pub reservation: Option<Reservation>,
}

/// Process-wide admission control for authed dispatches.
pub struct RateLimiter {
    store: Arc<Store>,
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    gate: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<Store>, limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
            gate: Mutex::new(()),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Check both windows without reserving. Purely advisory: admission
    /// re-checks under the gate.
    pub fn can_dispatch_authed(&self) -> Result<(), DispatchError> {
        let now_ms = self.clock.now_ms();
        self.check_windows(now_ms)
    }

    fn check_windows(&self, now_ms: i64) -> Result<(), DispatchError> {
        let count = self.store.count_authed_usage_5h(now_ms)?;
        if count >= self.limits.window_5h_cap {
            return Err(DispatchError::RateLimited {
                window: RateWindow::FiveHour,
                count,
                cap: self.limits.window_5h_cap,
            });
        }
        let count = self.store.count_authed_usage_weekly(now_ms)?;
        if count >= self.limits.weekly_cap {
            return Err(DispatchError::RateLimited {
                window: RateWindow::Weekly,
                count,
                cap: self.limits.weekly_cap,
            });
        }
        Ok(())
    }

    /// Atomically reserve a slot for an authed dispatch.
    ///
    /// Check, insert, re-check: if the insert pushed either window past its
    /// cap the row is deleted and the binding window reported. The returned
    /// guard's row is what the window queries count.
    pub fn reserve(
        &self,
        provider: &str,
        agent: &str,
        work_item: &str,
    ) -> Result<Reservation, DispatchError> {
        let _gate = self.gate.lock();
        let now_ms = self.clock.now_ms();

        self.check_windows(now_ms)?;

        let usage_id = self
            .store
            .record_provider_usage(provider, agent, work_item, now_ms)?;

        // Post-insert the count includes our row; > cap means we overshot.
        if let Err(violation) = self.recheck_after_insert(now_ms) {
            self.store.delete_provider_usage(usage_id)?;
            return Err(violation);
        }

        Ok(Reservation {
            store: Arc::clone(&self.store),
            usage_id,
        })
    }

    fn recheck_after_insert(&self, now_ms: i64) -> Result<(), DispatchError> {
        let count = self.store.count_authed_usage_5h(now_ms)?;
        if count > self.limits.window_5h_cap {
            return Err(DispatchError::RateLimited {
                window: RateWindow::FiveHour,
                count,
                cap: self.limits.window_5h_cap,
            });
        }
        let count = self.store.count_authed_usage_weekly(now_ms)?;
        if count > self.limits.weekly_cap {
            return Err(DispatchError::RateLimited {
                window: RateWindow::Weekly,
                count,
                cap: self.limits.weekly_cap,
            });
        }
        Ok(())
    }

    /// Walk `candidates` in order and reserve the first eligible provider.
    ///
    /// Unknown names and excluded models are skipped. Unauthed providers
    /// return immediately without touching the windows. The first authed
    /// rate-limit violation returns eagerly: all authed providers share one
    /// cap, so iterating further is wasted work. `Ok(None)` means no
    /// candidate remained.
    pub fn pick_and_reserve(
        &self,
        candidates: &[String],
        providers: &HashMap<String, ProviderConfig>,
        exclude_models: &HashSet<String>,
        agent: &str,
        work_item: &str,
    ) -> Result<Option<PickedProvider>, DispatchError> {
        for name in candidates {
            let Some(config) = providers.get(name) else {
                tracing::warn!(provider = %name, "tier references unknown provider, skipping");
                continue;
            };
            if exclude_models.contains(&config.model) {
                continue;
            }

            if !config.authed {
                return Ok(Some(PickedProvider {
                    name: name.clone(),
                    config: config.clone(),
                    reservation: None,
                }));
            }

            // Any reserve failure, rate limit included, returns eagerly
            let reservation = self.reserve(name, agent, work_item)?;
            return Ok(Some(PickedProvider {
                name: name.clone(),
                config: config.clone(),
                reservation: Some(reservation),
            }));
        }
        Ok(None)
    }

    /// Observational: whether weekly usage has crossed the headroom
    /// threshold.
    pub fn headroom_warning(&self) -> Result<bool, StoreError> {
        let usage = self.store.count_authed_usage_weekly(self.clock.now_ms())?;
        Ok(usage as f64 >= self.limits.weekly_headroom_pct * self.limits.weekly_cap as f64)
    }

    /// Weekly window utilization in percent, for the status surface.
    pub fn weekly_usage_pct(&self) -> Result<f64, StoreError> {
        let usage = self.store.count_authed_usage_weekly(self.clock.now_ms())?;
        if self.limits.weekly_cap == 0 {
            return Ok(100.0);
        }
        Ok(usage as f64 * 100.0 / self.limits.weekly_cap as f64)
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
