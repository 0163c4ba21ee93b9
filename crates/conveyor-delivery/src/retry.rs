//! Backoff schedule for failed delivery attempts.
//!
//! The delay table is fixed and aligned with the worker roster: each tier's
//! poll interval is well below the delay that makes rows eligible at that
//! tier, so polls are rarely wasted. Jitter spreads re-arrival to prevent
//! correlated retry storms.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Jitter applied around the base delay, as a fraction of it.
pub const JITTER_FACTOR: f64 = 0.25;

/// Floor for any computed delay.
pub const MIN_DELAY: Duration = Duration::from_secs(60);

/// Base delay before the next attempt, keyed by the retry count at the time
/// of the failure (before the increment).
pub fn base_delay(retry_count: i32) -> Duration {
    match retry_count {
        0 => Duration::from_secs(60),          // next attempt at tier 1
        1 => Duration::from_secs(5 * 60),      // tier 2
        2 => Duration::from_secs(10 * 60),     // tier 3
        3 => Duration::from_secs(30 * 60),     // tier 4
        4 => Duration::from_secs(60 * 60),     // tier 5
        5 => Duration::from_secs(120 * 60),    // tier 6 (final)
        _ => Duration::from_secs(4 * 60 * 60), // fallback
    }
}

/// Computes the delay before the next attempt: base delay with ±25% uniform
/// jitter, clamped to a one-minute floor.
pub fn backoff_delay(retry_count: i32) -> Duration {
    let base = base_delay(retry_count);

    let jitter_range = base.as_secs_f64() * JITTER_FACTOR;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
    let delayed = base.as_secs_f64() + jitter;

    Duration::from_secs_f64(delayed.max(MIN_DELAY.as_secs_f64()))
}

/// The instant the next attempt becomes eligible.
pub fn next_retry_at(retry_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay = backoff_delay(retry_count);
    now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(4))
}
