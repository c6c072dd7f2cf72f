// Stuck-job detection
//
// The health check restarts a job's timer when it has been quiet for more
// than `STALE_FACTOR` intervals or its timer task is gone. The watchdog only
// looks at distribution and ends the process once no cycle has succeeded for
// `WATCHDOG_FACTOR` intervals.

use super::registry::JobRunRecord;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const STALE_FACTOR: u32 = 2;
pub const WATCHDOG_FACTOR: u32 = 3;

fn exceeded(since: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    match chrono::Duration::from_std(limit) {
        Ok(limit) => now.signed_duration_since(since) > limit,
        Err(_) => false,
    }
}

/// Should the health check tear down and recreate this job's timer?
pub fn needs_restart(
    record: &JobRunRecord,
    interval: Duration,
    timer_alive: bool,
    scheduler_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    if !timer_alive {
        return true;
    }
    if record.is_running {
        return false;
    }

    let reference = record.last_completed_at.unwrap_or(scheduler_started_at);
    exceeded(reference, now, interval.saturating_mul(STALE_FACTOR))
}

/// Has distribution gone too long without a successful cycle?
pub fn is_stalled(
    record: &JobRunRecord,
    interval: Duration,
    scheduler_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let reference = record.last_succeeded_at.unwrap_or(scheduler_started_at);
    exceeded(reference, now, interval.saturating_mul(WATCHDOG_FACTOR))
}
