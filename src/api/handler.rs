use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::models::HealthResponse;
use crate::{
    accumulator::AccumulatorStore,
    error::{AppError, AppResult},
    jobs::JobKind,
    scheduler::{JobStatus, Scheduler},
};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub accumulator: Arc<AccumulatorStore>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let jobs = state.scheduler.status();
    let distribution_stalled = state.scheduler.distribution_stalled();
    let healthy = !distribution_stalled && jobs.iter().all(|job| !job.stuck);

    Ok(Json(HealthResponse {
        status: if healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now(),
        accumulated_sol: state.accumulator.balance().await,
        distribution_stalled,
        jobs,
    }))
}

/// GET /jobs/:name
pub async fn job_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<JobStatus>> {
    debug!("Job status requested: {}", name);
    let kind: JobKind = name.parse()?;

    state
        .scheduler
        .status()
        .into_iter()
        .find(|status| status.job == kind)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job '{}' is not scheduled", kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobIntervals;
    use crate::jobs::Job;
    use crate::scheduler::RetryPolicy;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct IdleJob(JobKind);

    #[async_trait]
    impl Job for IdleJob {
        fn kind(&self) -> JobKind {
            self.0
        }

        async fn run(&self) -> AppResult<()> {
            Ok(())
        }
    }

    async fn state() -> (AppState, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("accumulator-{}.json", Uuid::new_v4()));
        let accumulator = Arc::new(AccumulatorStore::open(&path).await);
        accumulator.add(dec!(2.5)).await.unwrap();

        let scheduler = Arc::new(Scheduler::new(
            vec![Arc::new(IdleJob(JobKind::Distribute)) as Arc<dyn Job>],
            JobIntervals::default(),
            RetryPolicy::default(),
        ));
        scheduler.start_timer(JobKind::Distribute);

        (
            AppState {
                scheduler,
                accumulator,
            },
            path,
        )
    }

    #[tokio::test]
    async fn test_health_reports_balance_and_jobs() {
        let (state, path) = state().await;

        let Json(health) = health_check(State(state.clone())).await.unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.accumulated_sol, dec!(2.5));
        assert_eq!(health.jobs.len(), 1);
        assert_eq!(health.jobs[0].job, JobKind::Distribute);
        assert!(!health.jobs[0].stuck);

        state.scheduler.shutdown();
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_job_status_lookup() {
        let (state, path) = state().await;

        let Json(status) = job_status(State(state.clone()), Path("distribute".to_string()))
            .await
            .unwrap();
        assert_eq!(status.job, JobKind::Distribute);
        assert_eq!(status.interval_ms, 300_000);

        // known name but not scheduled
        let missing = job_status(State(state.clone()), Path("withdraw".to_string())).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let unknown = job_status(State(state.clone()), Path("mint".to_string())).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        state.scheduler.shutdown();
        tokio::fs::remove_file(&path).await.ok();
    }
}
