use super::{Job, JobKind};
use crate::{
    accumulator::AccumulatorStore,
    error::{AppError, AppResult, DistributionError},
    payout::{DistributionReport, PayoutDistributor},
    recipients::ShareProvider,
};
use async_trait::async_trait;
use futures::FutureExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn sol_to_lamports(amount: Decimal) -> AppResult<u64> {
    (amount * Decimal::from(LAMPORTS_PER_SOL))
        .floor()
        .to_u64()
        .ok_or_else(|| DistributionError::InvalidAmount(format!("{} SOL", amount)).into())
}

/// Drains the accumulator and pays it out to the current share snapshot.
pub struct DistributeJob {
    accumulator: Arc<AccumulatorStore>,
    shares: Arc<dyn ShareProvider>,
    distributor: Arc<PayoutDistributor>,
}

impl DistributeJob {
    pub fn new(
        accumulator: Arc<AccumulatorStore>,
        shares: Arc<dyn ShareProvider>,
        distributor: Arc<PayoutDistributor>,
    ) -> Self {
        Self {
            accumulator,
            shares,
            distributor,
        }
    }

    async fn cycle(&self, amount: Decimal) -> AppResult<DistributionReport> {
        let shares = self.shares.fetch_shares().await?;
        if shares.is_empty() {
            return Err(DistributionError::NoRecipients.into());
        }

        let lamports = sol_to_lamports(amount)?;
        self.distributor.distribute(lamports, &shares).await
    }

    async fn restore(&self, amount: Decimal) {
        match self.accumulator.restore(amount).await {
            Ok(total) => warn!("↩️ Restored {} SOL to accumulator (now {})", amount, total),
            Err(e) => error!(
                "🚨 Failed to restore {} SOL after a failed cycle, reconcile manually: {}",
                amount, e
            ),
        }
    }
}

#[async_trait]
impl Job for DistributeJob {
    fn kind(&self) -> JobKind {
        JobKind::Distribute
    }

    async fn run(&self) -> AppResult<()> {
        let amount = self.accumulator.take_all().await?;
        if amount.is_zero() {
            info!("💤 Nothing accumulated, skipping distribution");
            return Ok(());
        }

        info!("🚀 Starting distribution of {} SOL", amount);

        match AssertUnwindSafe(self.cycle(amount)).catch_unwind().await {
            Ok(Ok(report)) => {
                if !report.is_complete() {
                    // funds for failed batches are not re-queued
                    warn!(
                        "⚠️ {} of {} batches failed; not restoring {} SOL",
                        report.failed.len(),
                        report.batch_count(),
                        amount
                    );
                }
                Ok(())
            }
            Ok(Err(e)) => {
                error!("❌ Distribution cycle failed: {}", e);
                self.restore(amount).await;
                Err(e)
            }
            Err(_) => {
                error!("❌ Distribution cycle panicked");
                self.restore(amount).await;
                Err(AppError::Internal("distribution cycle panicked".to_string()))
            }
        }
    }
}
