// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll-with-deadline helper.
//!
//! The session and subprocess backends, and every timing-sensitive test,
//! wait by polling with exponential backoff instead of fixed sleeps. On
//! deadline the last observed value is returned, never a synthesized one.

use std::future::Future;
use std::time::Duration;

/// Poll `probe` until it returns `Some`, the deadline elapses, or the probe
/// can no longer make progress.
///
/// The interval starts at `initial` and doubles up to one second. Returns
/// `None` only when the deadline elapsed without the probe ever producing a
/// value.
pub async fn poll_until<T, F, Fut>(deadline: Duration, initial: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    const MAX_INTERVAL: Duration = Duration::from_secs(1);

    let start = tokio::time::Instant::now();
    let mut interval = initial.max(Duration::from_millis(1));

    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if start.elapsed() >= deadline {
            return None;
        }
        let remaining = deadline.saturating_sub(start.elapsed());
        tokio::time::sleep(interval.min(remaining)).await;
        interval = (interval * 2).min(MAX_INTERVAL);
    }
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
