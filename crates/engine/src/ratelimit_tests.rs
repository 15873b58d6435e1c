// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cortex_core::{Clock, FakeClock, Tier};
use cortex_store::WINDOW_5H_MS;

fn limiter(caps: (u32, u32)) -> (Arc<Store>, Arc<FakeClock>, RateLimiter) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let clock = Arc::new(FakeClock::new());
    let limiter = RateLimiter::new(
        Arc::clone(&store),
        RateLimits {
            window_5h_cap: caps.0,
            weekly_cap: caps.1,
            weekly_headroom_pct: 0.8,
        },
        clock.clone() as Arc<dyn cortex_core::Clock>,
    );
    (store, clock, limiter)
}

fn provider(authed: bool, model: &str) -> ProviderConfig {
    ProviderConfig {
        model: model.into(),
        tier: Tier::Balanced,
        authed,
    }
}

#[test]
fn reserve_inserts_usage_row() {
    let (store, clock, limiter) = limiter((3, 100));
    let reservation = limiter.reserve("sonnet", "coder", "w1").unwrap();
    assert!(reservation.usage_id() > 0);
    assert_eq!(store.count_authed_usage_5h(clock.now_ms()).unwrap(), 1);
    reservation.commit();
    assert_eq!(store.count_authed_usage_5h(clock.now_ms()).unwrap(), 1);
}

#[test]
fn release_rolls_back() {
    let (store, clock, limiter) = limiter((3, 100));
    let reservation = limiter.reserve("sonnet", "coder", "w1").unwrap();
    reservation.release().unwrap();
    assert_eq!(store.count_authed_usage_5h(clock.now_ms()).unwrap(), 0);
}

#[test]
fn short_window_cap_binds() {
    let (_store, _clock, limiter) = limiter((2, 100));
    limiter.reserve("sonnet", "coder", "w1").unwrap().commit();
    limiter.reserve("sonnet", "coder", "w2").unwrap().commit();

    let err = limiter.reserve("sonnet", "coder", "w3").unwrap_err();
    assert!(matches!(
        err,
        DispatchError::RateLimited {
            window: RateWindow::FiveHour,
            count: 2,
            cap: 2
        }
    ));
}

#[test]
fn weekly_cap_binds_after_short_window_rolls_off() {
    let (_store, clock, limiter) = limiter((10, 3));
    for i in 0..3 {
        limiter
            .reserve("sonnet", "coder", &format!("w{}", i))
            .unwrap()
            .commit();
    }
    // Step past the 5h window: the short count resets, weekly still binds
    clock.advance_ms(WINDOW_5H_MS + 1);

    let err = limiter.reserve("sonnet", "coder", "w9").unwrap_err();
    assert!(matches!(
        err,
        DispatchError::RateLimited {
            window: RateWindow::Weekly,
            ..
        }
    ));
}

#[test]
fn can_dispatch_authed_is_advisory() {
    let (_store, _clock, limiter) = limiter((1, 100));
    assert!(limiter.can_dispatch_authed().is_ok());
    limiter.reserve("sonnet", "coder", "w1").unwrap().commit();
    assert!(limiter.can_dispatch_authed().is_err());
}

#[test]
fn concurrent_reservations_never_exceed_cap() {
    let (store, clock, limiter) = limiter((5, 100));
    let limiter = Arc::new(limiter);

    let mut handles = Vec::new();
    for i in 0..32 {
        let limiter = Arc::clone(&limiter);
        handles.push(std::thread::spawn(move || {
            limiter
                .reserve("sonnet", "coder", &format!("w{}", i))
                .map(Reservation::commit)
                .is_ok()
        }));
    }

    let admitted = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .filter(|&ok| ok)
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(store.count_authed_usage_5h(clock.now_ms()).unwrap(), 5);
}

#[test]
fn pick_skips_unknown_and_excluded() {
    let (_store, _clock, limiter) = limiter((5, 100));
    let mut providers = HashMap::new();
    providers.insert("cheap".to_string(), provider(false, "mini-1"));
    providers.insert("big".to_string(), provider(true, "opus-9"));

    let candidates = vec![
        "ghost".to_string(), // not configured
        "cheap".to_string(), // excluded by model
        "big".to_string(),
    ];
    let mut exclude = HashSet::new();
    exclude.insert("mini-1".to_string());

    let picked = limiter
        .pick_and_reserve(&candidates, &providers, &exclude, "coder", "w1")
        .unwrap()
        .unwrap();
    assert_eq!(picked.name, "big");
    assert!(picked.reservation.is_some());
    picked.reservation.unwrap().commit();
}

#[test]
fn pick_returns_unauthed_without_reservation() {
    let (store, clock, limiter) = limiter((5, 100));
    let mut providers = HashMap::new();
    providers.insert("local".to_string(), provider(false, "llama"));

    let picked = limiter
        .pick_and_reserve(&["local".to_string()], &providers, &HashSet::new(), "a", "w")
        .unwrap()
        .unwrap();
    assert!(picked.reservation.is_none());
    // Unauthed dispatches never touch the windows
    assert_eq!(store.count_authed_usage_5h(clock.now_ms()).unwrap(), 0);
}

#[test]
fn pick_returns_eagerly_on_rate_limit() {
    let (_store, _clock, limiter) = limiter((0, 100));
    let mut providers = HashMap::new();
    providers.insert("a1".to_string(), provider(true, "m1"));
    providers.insert("a2".to_string(), provider(true, "m2"));

    let err = limiter
        .pick_and_reserve(
            &["a1".to_string(), "a2".to_string()],
            &providers,
            &HashSet::new(),
            "coder",
            "w1",
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::RateLimited { .. }));
}

#[test]
fn pick_exhausted_candidates_is_none() {
    let (_store, _clock, limiter) = limiter((5, 100));
    let picked = limiter
        .pick_and_reserve(&["ghost".to_string()], &HashMap::new(), &HashSet::new(), "a", "w")
        .unwrap();
    assert!(picked.is_none());
}

#[test]
fn headroom_warning_trips_at_threshold() {
    let (_store, _clock, limiter) = limiter((100, 10)); // headroom at 8
    for i in 0..7 {
        limiter
            .reserve("sonnet", "coder", &format!("w{}", i))
            .unwrap()
            .commit();
    }
    assert!(!limiter.headroom_warning().unwrap());

    limiter.reserve("sonnet", "coder", "w8").unwrap().commit();
    assert!(limiter.headroom_warning().unwrap());
    assert!((limiter.weekly_usage_pct().unwrap() - 80.0).abs() < f64::EPSILON);
}
