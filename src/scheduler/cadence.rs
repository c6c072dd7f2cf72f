use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// First wall-clock multiple of `interval` strictly after `now`, so a five
/// minute interval fires at :00, :05, :10 and so on.
pub fn next_aligned_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = (interval.as_millis() as i64).max(1);
    let next = (now.timestamp_millis().div_euclid(step) + 1) * step;

    Utc.timestamp_millis_opt(next)
        .single()
        .unwrap_or_else(|| now + chrono::Duration::milliseconds(step))
}

/// Time to wait from `now` until the next aligned tick
pub fn until_next_tick(now: DateTime<Utc>, interval: Duration) -> Duration {
    next_aligned_tick(now, interval)
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(interval)
}
