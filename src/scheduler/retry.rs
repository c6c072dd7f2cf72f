use crate::error::{AppError, AppResult};
use crate::jobs::Job;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Run the job body up to `max_attempts` times. A panic counts as a failed attempt.
pub async fn run_with_retry(job: &dyn Job, policy: &RetryPolicy) -> AppResult<()> {
    let mut attempt = 1u32;

    loop {
        let outcome = AssertUnwindSafe(job.run())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Internal(format!("{} job panicked", job.kind()))));

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    "🔄 {} attempt {}/{} failed: {}. Retrying in {:?}",
                    job.kind(),
                    attempt,
                    policy.max_attempts,
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("❌ {} failed after {} attempts: {}", job.kind(), attempt, e);
                return Err(e);
            }
        }
    }
}
