use crate::scheduler::JobStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// ========== RESPONSE MODELS ==========

/// Service health: run records, undistributed balance, stuck flags
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// SOL converted but not yet distributed
    pub accumulated_sol: Decimal,
    pub distribution_stalled: bool,
    pub jobs: Vec<JobStatus>,
}
