//! Retry scheduling for failed queue items.
//!
//! A failed item becomes eligible again `2^(retry_count + 1)` seconds after the
//! failure, where `retry_count` is the value *after* the failure was counted:
//! the first failure waits 4s, the second 8s, and so on. Retries are unbounded;
//! `max_retries` is stored on each row but not enforced here.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Exponent ceiling so the delay never overflows a timestamp. 2^30s is ~34 years.
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Delay before the next attempt, given the post-increment retry count.
pub fn retry_delay(retry_count: i32) -> Duration {
    let exponent = (retry_count.max(0) as u32)
        .saturating_add(1)
        .min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(1u64 << exponent)
}

pub fn next_retry_at(now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(retry_delay(retry_count))
        .unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
