pub mod convert;
pub mod distribute;
pub mod fetch_holders;
pub mod withdraw;

pub use convert::{ConvertJob, ConvertSettings, TreasurySplit};
pub use distribute::DistributeJob;
pub use fetch_holders::FetchHoldersJob;
pub use withdraw::{WithdrawJob, WithdrawSettings};

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FetchHolders,
    Withdraw,
    Convert,
    Distribute,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::FetchHolders,
        JobKind::Withdraw,
        JobKind::Convert,
        JobKind::Distribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::FetchHolders => "fetch_holders",
            JobKind::Withdraw => "withdraw",
            JobKind::Convert => "convert",
            JobKind::Distribute => "distribute",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fetch_holders" | "holders" => Ok(JobKind::FetchHolders),
            "withdraw" => Ok(JobKind::Withdraw),
            "convert" | "sell" => Ok(JobKind::Convert),
            "distribute" => Ok(JobKind::Distribute),
            other => Err(AppError::NotFound(format!("job '{}'", other))),
        }
    }
}

/// A recurring unit of work driven by the scheduler
#[async_trait]
pub trait Job: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn run(&self) -> AppResult<()>;
}
