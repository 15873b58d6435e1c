// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry backoff and tier-escalation policy

use crate::tier::Tier;
use std::time::Duration;

/// Backoff parameters, sourced from `general.*` configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    /// Exponential growth factor, `>= 1`.
    pub factor: f64,
    pub max_retries: u32,
    /// Escalate one tier every N attempts. `0` disables escalation.
    pub escalate_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            factor: 2.0,
            max_retries: 3,
            escalate_after: 2,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryDecision {
    pub delay: Duration,
    pub tier: Tier,
    pub should_retry: bool,
}

impl RetryPolicy {
    /// Decide the next attempt for a failed dispatch.
    ///
    /// Returns `(0, current_tier, false)` once `attempt >= max_retries`.
    /// Otherwise the delay is the clamped exponential with up to 10%
    /// multiplicative jitter, and the tier escalates every
    /// `escalate_after` attempts.
    pub fn next_retry(&self, attempt: u32, current_tier: Tier) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision {
                delay: Duration::ZERO,
                tier: current_tier,
                should_retry: false,
            };
        }

        let jitter: f64 = rand::random::<f64>() * 0.1;
        let delay = self.deterministic_delay(attempt).mul_f64(1.0 + jitter);

        RetryDecision {
            delay,
            tier: self.escalated(attempt, current_tier),
            should_retry: true,
        }
    }

    /// The jitter-free delay for a given attempt: `clamp(base * factor^attempt,
    /// base, max_delay)`. Overflow and NaN clamp to `max_delay`.
    pub fn deterministic_delay(&self, attempt: u32) -> Duration {
        let base_secs = self.base.as_secs_f64();
        let raw = base_secs * self.factor.powi(attempt.min(i32::MAX as u32) as i32);

        if raw.is_nan() {
            return self.max_delay;
        }
        let max_secs = self.max_delay.as_secs_f64();
        let clamped = raw.clamp(base_secs, max_secs.max(base_secs));
        if !clamped.is_finite() {
            return self.max_delay;
        }
        Duration::from_secs_f64(clamped)
    }

    /// Whether enough time has elapsed since the last attempt for the item to
    /// be admissible at this tick. Uses the deterministic delay so the
    /// predicate is stable across calls.
    pub fn should_retry_now(&self, last_attempt_ms: i64, attempt: u32, now_ms: i64) -> bool {
        if attempt == 0 {
            return true;
        }
        let elapsed_ms = now_ms.saturating_sub(last_attempt_ms);
        // Backoff is indexed by the previous attempt number.
        let required = self.deterministic_delay(attempt.saturating_sub(1));
        elapsed_ms >= required.as_millis() as i64
    }

    fn escalated(&self, attempt: u32, current_tier: Tier) -> Tier {
        if self.escalate_after > 0 && attempt > 0 && attempt % self.escalate_after == 0 {
            current_tier.escalate()
        } else {
            current_tier
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
