// Job scheduler
//
// Each registered job gets its own timer task. Holder refresh, withdraw and
// convert tick on a fixed delay; distribution ticks on wall-clock multiples
// of its interval.
// Every tick spawns an execution guarded by the run record table, so a tick
// landing while the previous run is still going is a no-op.
//
// Two supervision loops run beside the timers:
// - health check: recreates the timer of any job that has gone quiet
// - watchdog: exits the process when distribution has stopped succeeding,
//   leaving the restart to the process supervisor

pub mod cadence;
pub mod health;
pub mod registry;
pub mod retry;

pub use registry::{JobRegistry, JobRunRecord};
pub use retry::{run_with_retry, RetryPolicy};

use crate::config::JobIntervals;
use crate::jobs::{Job, JobKind};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Run record plus the health verdict, as exposed on the status API
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobKind,
    #[serde(flatten)]
    pub record: JobRunRecord,
    pub interval_ms: u64,
    pub stuck: bool,
}

pub struct Scheduler {
    jobs: HashMap<JobKind, Arc<dyn Job>>,
    registry: Arc<JobRegistry>,
    intervals: RwLock<JobIntervals>,
    retry: RetryPolicy,
    timers: Mutex<HashMap<JobKind, JoinHandle<()>>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(jobs: Vec<Arc<dyn Job>>, intervals: JobIntervals, retry: RetryPolicy) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.kind(), job)).collect(),
            registry: Arc::new(JobRegistry::new()),
            intervals: RwLock::new(intervals),
            retry,
            timers: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn intervals(&self) -> JobIntervals {
        *self.intervals.read()
    }

    pub fn has_job(&self, kind: JobKind) -> bool {
        self.jobs.contains_key(&kind)
    }

    /// Registered jobs in pipeline order
    pub fn kinds(&self) -> Vec<JobKind> {
        JobKind::ALL.into_iter().filter(|kind| self.has_job(*kind)).collect()
    }

    /// Run one job invocation with retries. Returns `false` without running
    /// anything if the job is unknown or already running.
    pub async fn execute(&self, kind: JobKind) -> bool {
        let Some(job) = self.jobs.get(&kind) else {
            return false;
        };
        let Some(guard) = self.registry.try_begin(kind) else {
            debug!("⏭️ {} already running, skipping tick", kind);
            return false;
        };

        info!("▶️ Running {}", kind);
        match run_with_retry(job.as_ref(), &self.retry).await {
            Ok(()) => {
                info!("✓ {} completed", kind);
                guard.succeed();
            }
            Err(e) => error!("❌ {} gave up for this tick: {}", kind, e),
        }
        true
    }

    /// Startup sequence: holder refresh, withdraw and convert once each, in
    /// that order, then every timer and both supervision loops.
    pub async fn start(self: &Arc<Self>) {
        info!("⏰ Starting scheduler");

        for kind in [JobKind::FetchHolders, JobKind::Withdraw, JobKind::Convert] {
            if self.has_job(kind) {
                self.execute(kind).await;
            }
        }

        for kind in self.kinds() {
            self.start_timer(kind);
        }

        let health = tokio::spawn(Arc::clone(self).health_loop());
        let watchdog = tokio::spawn(Arc::clone(self).watchdog_loop());
        self.supervisors.lock().extend([health, watchdog]);
    }

    /// Cancel the existing timer for `kind`, if any, and register a new one.
    pub fn start_timer(self: &Arc<Self>, kind: JobKind) {
        if !self.has_job(kind) {
            return;
        }

        let period = self.intervals().for_job(kind);
        let scheduler = Arc::clone(self);
        let handle = match kind {
            JobKind::Distribute => tokio::spawn(scheduler.aligned_timer(kind)),
            _ => tokio::spawn(scheduler.fixed_timer(kind)),
        };

        if let Some(previous) = self.timers.lock().insert(kind, handle) {
            previous.abort();
        }
        info!("⏰ {} timer registered every {:?}", kind, period);
    }

    fn spawn_execution(self: &Arc<Self>, kind: JobKind) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.execute(kind).await;
        });
    }

    async fn fixed_timer(self: Arc<Self>, kind: JobKind) {
        let period = self.intervals().for_job(kind);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.spawn_execution(kind);
        }
    }

    async fn aligned_timer(self: Arc<Self>, kind: JobKind) {
        loop {
            let period = self.intervals().for_job(kind);
            let now = Utc::now();
            debug!(
                "{} next tick at {}",
                kind,
                cadence::next_aligned_tick(now, period).format("%H:%M:%S")
            );
            tokio::time::sleep(cadence::until_next_tick(now, period)).await;
            self.spawn_execution(kind);
        }
    }

    fn timer_alive(&self, kind: JobKind) -> bool {
        self.timers
            .lock()
            .get(&kind)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Current records with the health verdict for every registered job
    pub fn status(&self) -> Vec<JobStatus> {
        let now = Utc::now();
        let intervals = self.intervals();

        self.kinds()
            .into_iter()
            .map(|kind| {
                let record = self.registry.record(kind);
                let interval = intervals.for_job(kind);
                let stuck = health::needs_restart(
                    &record,
                    interval,
                    self.timer_alive(kind),
                    self.registry.started_at(),
                    now,
                );
                JobStatus {
                    job: kind,
                    record,
                    interval_ms: interval.as_millis() as u64,
                    stuck,
                }
            })
            .collect()
    }

    /// One health pass; returns the jobs whose timers were recreated
    pub fn check_health(self: &Arc<Self>) -> Vec<JobKind> {
        let restarted: Vec<JobKind> = self
            .status()
            .into_iter()
            .filter(|status| status.stuck)
            .map(|status| status.job)
            .collect();

        for kind in &restarted {
            warn!("🩺 {} looks stuck, recreating its timer", kind);
            self.start_timer(*kind);
        }
        restarted
    }

    async fn health_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.intervals().health_check).await;
            let restarted = self.check_health();
            if restarted.is_empty() {
                debug!("🩺 All jobs healthy");
            }
            self.heartbeat();
        }
    }

    fn heartbeat(&self) {
        let uptime = Utc::now().signed_duration_since(self.registry.started_at());
        let running = self
            .kinds()
            .into_iter()
            .filter(|kind| self.registry.record(*kind).is_running)
            .count();
        info!(
            "💓 Heartbeat: up {}m, {} of {} jobs running",
            uptime.num_minutes(),
            running,
            self.jobs.len()
        );
    }

    /// Has distribution stopped succeeding?
    pub fn distribution_stalled(&self) -> bool {
        if !self.has_job(JobKind::Distribute) {
            return false;
        }
        health::is_stalled(
            &self.registry.record(JobKind::Distribute),
            self.intervals().distribute,
            self.registry.started_at(),
            Utc::now(),
        )
    }

    async fn watchdog_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.intervals().watchdog).await;
            if self.distribution_stalled() {
                error!(
                    "🚨 Distribution has not succeeded within {} intervals, exiting for restart",
                    health::WATCHDOG_FACTOR
                );
                std::process::exit(1);
            }
        }
    }

    /// Apply new cadences. The distribution and holder refresh timers are
    /// recreated immediately; the others pick up the change on their next
    /// restart.
    pub fn reload(self: &Arc<Self>, intervals: JobIntervals) {
        let previous = {
            let mut current = self.intervals.write();
            std::mem::replace(&mut *current, intervals)
        };
        if previous == intervals {
            return;
        }

        info!("🔁 Job intervals reloaded: {:?}", intervals);
        self.start_timer(JobKind::Distribute);
        self.start_timer(JobKind::FetchHolders);
    }

    /// Cancel every timer and supervision loop. In-flight runs are not awaited.
    pub fn shutdown(&self) {
        for (kind, handle) in self.timers.lock().drain() {
            debug!("Cancelling {} timer", kind);
            handle.abort();
        }
        for handle in self.supervisors.lock().drain(..) {
            handle.abort();
        }
        info!("⏹️ Scheduler stopped");
    }
}
