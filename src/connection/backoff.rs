//! Retry backoff for the synchronous POST path.
//!
//! Capped exponential growth with jitter drawn into the upper half of the
//! window, so concurrent clients retrying against a struggling backend do
//! not stampede in lockstep.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Delay to sleep after attempt `attempt` (0-based) fails.
pub(crate) fn delay_for_attempt(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;

    // base * 2^attempt, saturating, then capped
    let shift = attempt.min(16);
    let full = base_ms.saturating_mul(1u64 << shift).min(cap_ms);

    // Jitter into [full/2, full]
    let half = full / 2;
    let jitter = if half == 0 { 0 } else { entropy() % (half + 1) };
    Duration::from_millis(half + jitter)
}

fn entropy() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}
