use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Swap error: {0}")]
    Swap(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External error: {0}")]
    ExternalError(String),
}

/// Accumulator record errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to encode accumulator record: {0}")]
    Encode(String),
}

/// Ledger RPC errors, classified so callers can decide whether to retry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The RPC node throttled the request (HTTP 429); transient
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The node refused the transaction; never retried
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("Lease expired at block height {last_valid_block_height} before confirmation")]
    LeaseExpired { last_valid_block_height: u64 },

    #[error("Transaction failed on-chain: {0}")]
    FailedOnChain(String),

    #[error("Send retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl LedgerError {
    /// Map a raw RPC failure message onto the retry taxonomy.
    pub fn classify_send_failure(message: String) -> Self {
        if message.contains("429") || message.to_lowercase().contains("too many requests") {
            LedgerError::RateLimited(message)
        } else {
            LedgerError::Rejected(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LedgerError::RateLimited(_))
    }
}

/// Distribution-cycle errors raised before any batch is sent
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("No recipients found")]
    NoRecipients,

    #[error("Invalid distribution amount: {0}")]
    InvalidAmount(String),

    #[error("Failed to acquire ledger lease: {0}")]
    LeaseAcquisition(String),

    #[error("Failed to build payout batch {index}: {message}")]
    BatchConstruction { index: usize, message: String },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                message.clone(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_send_failure() {
        let throttled = LedgerError::classify_send_failure(
            "HTTP status client error (429 Too Many Requests)".to_string(),
        );
        assert!(throttled.is_rate_limited());

        let rejected = LedgerError::classify_send_failure(
            "Transaction simulation failed: insufficient funds".to_string(),
        );
        assert_eq!(
            rejected,
            LedgerError::Rejected("Transaction simulation failed: insufficient funds".to_string())
        );
    }
}
