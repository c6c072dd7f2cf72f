use crate::{
    error::{AppError, AppResult, DistributionError},
    execution::{
        client::{Lease, LedgerClient},
        instructions::{distribute_by_percentage, set_compute_unit_price},
    },
    recipients::RecipientShare,
};
use futures::future::try_join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::{
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-transaction account limit of the payout program
pub const MAX_RECIPIENTS_PER_BATCH: usize = 10;

/// Floor for the computed priority fee, in micro-lamports per compute unit
pub const MIN_PRIORITY_FEE_MICRO_LAMPORTS: u64 = 80_000;

/// One settlement transaction's worth of recipients. Immutable once built.
#[derive(Debug, Clone)]
pub struct PayoutBatch {
    pub index: usize,
    pub recipients: Vec<Pubkey>,
    pub basis_points: Vec<u32>,
    pub lease: Lease,
    pub priority_fee: u64,
}

impl PayoutBatch {
    /// Sign the batch's transaction: priority fee first, then the payout.
    pub fn sign(
        &self,
        program_id: &Pubkey,
        funder: &Keypair,
        total_lamports: u64,
    ) -> AppResult<VersionedTransaction> {
        let payer = funder.pubkey();
        let instructions = vec![
            set_compute_unit_price(self.priority_fee),
            distribute_by_percentage(
                program_id,
                &payer,
                &self.recipients,
                total_lamports,
                &self.basis_points,
            )?,
        ];

        let message = Message::new_with_blockhash(&instructions, Some(&payer), &self.lease.blockhash);
        VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[funder]).map_err(|e| {
            DistributionError::BatchConstruction {
                index: self.index,
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Consecutive groups of at most `MAX_RECIPIENTS_PER_BATCH`, in provider order
pub fn partition(shares: &[RecipientShare]) -> Vec<&[RecipientShare]> {
    shares.chunks(MAX_RECIPIENTS_PER_BATCH).collect()
}

/// `floor(percentage * 100)`; the remainder is never redistributed
pub fn to_basis_points(percentage: Decimal) -> AppResult<u32> {
    (percentage * Decimal::ONE_HUNDRED)
        .floor()
        .to_u32()
        .ok_or_else(|| {
            DistributionError::InvalidAmount(format!("Percentage {} out of range", percentage)).into()
        })
}

/// Median of the samples times 1.5, never below the minimum fee
pub fn priority_fee_from_samples(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return MIN_PRIORITY_FEE_MICRO_LAMPORTS;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];

    (median.saturating_mul(3) / 2).max(MIN_PRIORITY_FEE_MICRO_LAMPORTS)
}

pub struct PayoutBatcher {
    ledger: Arc<dyn LedgerClient>,
}

impl PayoutBatcher {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// One fee for the whole cycle. Missing telemetry falls back to the floor.
    pub async fn priority_fee(&self) -> u64 {
        match self.ledger.recent_prioritization_fees().await {
            Ok(samples) => {
                let fee = priority_fee_from_samples(&samples);
                debug!("Priority fee {} from {} samples", fee, samples.len());
                fee
            }
            Err(e) => {
                warn!("⚠️ Fee telemetry unavailable, using minimum: {}", e);
                MIN_PRIORITY_FEE_MICRO_LAMPORTS
            }
        }
    }

    /// Partition the shares and attach one freshly acquired lease to each
    /// group. Leases are fetched concurrently before anything is signed.
    pub async fn build(&self, shares: &[RecipientShare], priority_fee: u64) -> AppResult<Vec<PayoutBatch>> {
        if shares.is_empty() {
            return Ok(vec![]);
        }

        let groups = partition(shares);
        let leases = try_join_all(groups.iter().map(|_| self.ledger.latest_lease()))
            .await
            .map_err(|e| AppError::from(DistributionError::LeaseAcquisition(e.to_string())))?;

        let batches = groups
            .into_iter()
            .zip(leases)
            .enumerate()
            .map(|(index, (group, lease))| {
                let basis_points = group
                    .iter()
                    .map(|share| to_basis_points(share.percentage))
                    .collect::<AppResult<Vec<_>>>()?;

                Ok(PayoutBatch {
                    index,
                    recipients: group.iter().map(|share| share.address).collect(),
                    basis_points,
                    lease,
                    priority_fee,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        info!(
            "📦 Built {} batches for {} recipients (priority fee {})",
            batches.len(),
            shares.len(),
            priority_fee
        );
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mock::MockLedger;
    use rust_decimal_macros::dec;

    fn shares(n: usize) -> Vec<RecipientShare> {
        (0..n)
            .map(|_| RecipientShare::new(Pubkey::new_unique(), dec!(4)).unwrap())
            .collect()
    }

    #[test]
    fn test_partition_law() {
        for n in [1usize, 9, 10, 11, 25, 30, 101] {
            let list = shares(n);
            let groups = partition(&list);

            assert_eq!(groups.len(), n.div_ceil(MAX_RECIPIENTS_PER_BATCH));
            assert!(groups.iter().all(|g| g.len() <= MAX_RECIPIENTS_PER_BATCH));
            let rejoined: Vec<RecipientShare> = groups.concat();
            assert_eq!(rejoined, list);
        }
        assert!(partition(&[]).is_empty());
    }

    #[test]
    fn test_basis_points_round_down() {
        assert_eq!(to_basis_points(dec!(33.335)).unwrap(), 3333);
        assert_eq!(to_basis_points(dec!(4)).unwrap(), 400);
        assert_eq!(to_basis_points(dec!(0.009)).unwrap(), 0);
        assert_eq!(to_basis_points(dec!(100)).unwrap(), 10_000);
    }

    #[test]
    fn test_priority_fee_uses_median() {
        assert_eq!(priority_fee_from_samples(&[]), MIN_PRIORITY_FEE_MICRO_LAMPORTS);
        assert_eq!(priority_fee_from_samples(&[10, 20, 30]), MIN_PRIORITY_FEE_MICRO_LAMPORTS);
        assert_eq!(
            priority_fee_from_samples(&[500_000, 100_000, 200_000]),
            300_000
        );
        // outliers do not move the median
        assert_eq!(
            priority_fee_from_samples(&[1, 100_000, 100_000, 100_000, u64::MAX]),
            150_000
        );
    }

    #[tokio::test]
    async fn test_build_acquires_one_lease_per_batch() {
        let ledger = Arc::new(MockLedger::default());
        let batcher = PayoutBatcher::new(ledger.clone());

        let batches = batcher.build(&shares(25), 90_000).await.unwrap();

        let sizes: Vec<usize> = batches.iter().map(|b| b.recipients.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(ledger.lease_requests.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(batches.iter().all(|b| b.priority_fee == 90_000));
        assert!(batches.iter().all(|b| b.basis_points.iter().all(|bp| *bp == 400)));
        assert_eq!(batches.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_build_empty_list_yields_no_batches() {
        let ledger = Arc::new(MockLedger::default());
        let batcher = PayoutBatcher::new(ledger.clone());

        assert!(batcher.build(&[], 90_000).await.unwrap().is_empty());
        assert_eq!(ledger.lease_requests.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lease_failure_is_cycle_fatal() {
        let ledger = Arc::new(MockLedger {
            fail_leases: true,
            ..Default::default()
        });
        let batcher = PayoutBatcher::new(ledger);

        let result = batcher.build(&shares(3), 90_000).await;
        assert!(matches!(
            result,
            Err(AppError::Distribution(DistributionError::LeaseAcquisition(_)))
        ));
    }

    #[test]
    fn test_signed_batch_carries_fee_then_payout() {
        let funder = Keypair::new();
        let program = Pubkey::new_unique();
        let batch = PayoutBatch {
            index: 0,
            recipients: vec![Pubkey::new_unique(), Pubkey::new_unique()],
            basis_points: vec![6600, 3400],
            lease: Lease {
                blockhash: solana_sdk::hash::Hash::new_from_array([7; 32]),
                last_valid_block_height: 10,
            },
            priority_fee: 100_000,
        };

        let tx = batch.sign(&program, &funder, 5_000).unwrap();

        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.message.static_account_keys()[0], funder.pubkey());
        assert_eq!(*tx.message.recent_blockhash(), batch.lease.blockhash);
        assert_eq!(tx.message.instructions().len(), 2);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }
}
