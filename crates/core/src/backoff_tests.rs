// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn policy() -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_secs(60),
        max_delay: Duration::from_secs(3600),
        factor: 2.0,
        max_retries: 50,
        escalate_after: 2,
    }
}

#[test]
fn delay_stays_within_bounds_for_all_attempts() {
    let policy = policy();
    for attempt in 1..=50 {
        let decision = policy.next_retry(attempt, Tier::Fast);
        assert!(decision.should_retry || attempt >= policy.max_retries);
        assert!(
            decision.delay >= policy.base,
            "attempt {}: delay {:?} below base",
            attempt,
            decision.delay
        );
        assert!(
            decision.delay <= policy.max_delay.mul_f64(1.1),
            "attempt {}: delay {:?} above 1.1 * max",
            attempt,
            decision.delay
        );
    }
}

#[test]
fn stops_at_max_retries() {
    let policy = RetryPolicy {
        max_retries: 3,
        ..policy()
    };
    let decision = policy.next_retry(3, Tier::Balanced);
    assert!(!decision.should_retry);
    assert_eq!(decision.delay, Duration::ZERO);
    assert_eq!(decision.tier, Tier::Balanced);

    let decision = policy.next_retry(10, Tier::Balanced);
    assert!(!decision.should_retry);
}

#[parameterized(
    attempt_1 = { 1, Tier::Fast, Tier::Fast },
    attempt_2 = { 2, Tier::Fast, Tier::Balanced },
    attempt_3 = { 3, Tier::Fast, Tier::Fast },
    attempt_4 = { 4, Tier::Fast, Tier::Balanced },
    premium_stays = { 2, Tier::Premium, Tier::Premium },
)]
fn escalates_every_n_attempts(attempt: u32, from: Tier, expected: Tier) {
    let decision = policy().next_retry(attempt, from);
    assert_eq!(decision.tier, expected);
}

#[test]
fn attempt_zero_never_escalates() {
    let decision = policy().next_retry(0, Tier::Fast);
    assert_eq!(decision.tier, Tier::Fast);
}

#[test]
fn escalation_disabled_when_zero() {
    let policy = RetryPolicy {
        escalate_after: 0,
        ..policy()
    };
    let decision = policy.next_retry(4, Tier::Fast);
    assert_eq!(decision.tier, Tier::Fast);
}

#[test]
fn overflow_clamps_to_max_delay() {
    let policy = RetryPolicy {
        factor: f64::MAX,
        ..policy()
    };
    assert_eq!(policy.deterministic_delay(40), policy.max_delay);
}

#[test]
fn huge_attempt_clamps_to_max_delay() {
    let policy = policy();
    assert_eq!(policy.deterministic_delay(10_000), policy.max_delay);
}

#[test]
fn deterministic_delay_grows_exponentially_then_caps() {
    let policy = policy();
    assert_eq!(policy.deterministic_delay(0), Duration::from_secs(60));
    assert_eq!(policy.deterministic_delay(1), Duration::from_secs(120));
    assert_eq!(policy.deterministic_delay(2), Duration::from_secs(240));
    assert_eq!(policy.deterministic_delay(6), Duration::from_secs(3600));
    assert_eq!(policy.deterministic_delay(7), Duration::from_secs(3600));
}

#[test]
fn should_retry_now_waits_for_deterministic_delay() {
    let policy = policy();
    let last = 1_000_000_i64;

    // First attempt of a fresh item is always admissible.
    assert!(policy.should_retry_now(0, 0, last));

    // attempt=1 requires deterministic_delay(0) = 60s after the last attempt
    assert!(!policy.should_retry_now(last, 1, last + 59_999));
    assert!(policy.should_retry_now(last, 1, last + 60_000));

    // attempt=2 requires 120s
    assert!(!policy.should_retry_now(last, 2, last + 60_000));
    assert!(policy.should_retry_now(last, 2, last + 120_000));
}
