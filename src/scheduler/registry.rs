use crate::jobs::JobKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-job bookkeeping, owned by the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobRunRecord {
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_succeeded_at: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub runs: u64,
    pub failures: u64,
}

/// The run record table. Job bodies never touch it directly; the scheduler
/// flips records through `try_begin` and the returned guard.
pub struct JobRegistry {
    records: Mutex<HashMap<JobKind, JobRunRecord>>,
    started_at: DateTime<Utc>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Mark `kind` running. `None` if it already is.
    pub fn try_begin(self: &Arc<Self>, kind: JobKind) -> Option<RunGuard> {
        let mut records = self.records.lock();
        let record = records.entry(kind).or_default();
        if record.is_running {
            return None;
        }

        record.is_running = true;
        record.last_started_at = Some(Utc::now());
        record.runs += 1;

        Some(RunGuard {
            registry: Arc::clone(self),
            kind,
            succeeded: false,
        })
    }

    pub fn record(&self, kind: JobKind) -> JobRunRecord {
        self.records.lock().get(&kind).cloned().unwrap_or_default()
    }

    fn finish(&self, kind: JobKind, succeeded: bool) {
        let now = Utc::now();
        let mut records = self.records.lock();
        let record = records.entry(kind).or_default();
        record.is_running = false;
        record.last_completed_at = Some(now);
        if succeeded {
            record.last_succeeded_at = Some(now);
        } else {
            record.failures += 1;
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one job invocation. Dropping it marks the job
/// idle again, as a failure unless `succeed` was called.
pub struct RunGuard {
    registry: Arc<JobRegistry>,
    kind: JobKind,
    succeeded: bool,
}

impl RunGuard {
    pub fn succeed(mut self) {
        self.succeeded = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.finish(self.kind, self.succeeded);
    }
}
