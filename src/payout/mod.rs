// Batched payout distribution
//
// A cycle runs in three stages:
// - build: one priority fee, shares split into batches of at most ten,
//   one lease per batch acquired concurrently
// - broadcast: every batch signed, then submitted concurrently with its own
//   rate-limit backoff and confirmation wait
// - aggregate: outcomes collected once every batch has settled
//
// Anything failing before the first send is returned as an error so the
// caller can restore the funds. Individual batch failures only show up in
// the report.

pub mod aggregator;
pub mod batcher;
pub mod broadcaster;

pub use aggregator::{BatchFailure, DistributionReport, TransactionOutcome};
pub use batcher::{PayoutBatch, PayoutBatcher, MAX_RECIPIENTS_PER_BATCH};
pub use broadcaster::{BroadcastPolicy, Broadcaster};

use crate::{
    error::{AppResult, DistributionError},
    execution::LedgerClient,
    recipients::RecipientShare,
};
use futures::future::join_all;
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::sync::Arc;
use tracing::info;

pub struct PayoutDistributor {
    batcher: PayoutBatcher,
    broadcaster: Broadcaster,
    signer: Arc<Keypair>,
    program_id: Pubkey,
    cluster: String,
}

impl PayoutDistributor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<Keypair>,
        program_id: Pubkey,
        policy: BroadcastPolicy,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            batcher: PayoutBatcher::new(ledger.clone()),
            broadcaster: Broadcaster::new(ledger, policy),
            signer,
            program_id,
            cluster: cluster.into(),
        }
    }

    /// Pay `total_lamports` out to `shares`. Every batch carries the full
    /// cycle total; the program applies each recipient's basis points to it.
    pub async fn distribute(&self, total_lamports: u64, shares: &[RecipientShare]) -> AppResult<DistributionReport> {
        if total_lamports == 0 {
            return Err(DistributionError::InvalidAmount("nothing to distribute".to_string()).into());
        }
        if shares.is_empty() {
            return Ok(DistributionReport::default());
        }

        info!(
            "💸 Distributing {} lamports to {} recipients",
            total_lamports,
            shares.len()
        );

        let priority_fee = self.batcher.priority_fee().await;
        let batches = self.batcher.build(shares, priority_fee).await?;

        let signed = batches
            .iter()
            .map(|batch| {
                batch
                    .sign(&self.program_id, &self.signer, total_lamports)
                    .map(|tx| (batch, tx))
            })
            .collect::<AppResult<Vec<_>>>()?;

        let outcomes = join_all(signed.iter().map(|(batch, tx)| async move {
            match self.broadcaster.broadcast(tx, &batch.lease).await {
                Ok(signature) => TransactionOutcome::Committed(signature),
                Err(e) => TransactionOutcome::Failed {
                    batch_index: batch.index,
                    reason: e.to_string(),
                },
            }
        }))
        .await;

        let report = DistributionReport::collect(outcomes);
        report.log(&self.cluster);
        Ok(report)
    }
}
