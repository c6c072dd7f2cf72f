use crate::execution::explorer_url;
use serde::Serialize;
use solana_sdk::signature::Signature;
use tracing::{error, info};

/// Result of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed(Signature),
    Failed { batch_index: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub reason: String,
}

/// Partitioned outcome of a full distribution cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    #[serde(serialize_with = "serialize_signatures")]
    pub successful: Vec<Signature>,
    pub failed: Vec<BatchFailure>,
}

fn serialize_signatures<S: serde::Serializer>(
    signatures: &[Signature],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(signatures.iter().map(|s| s.to_string()))
}

impl DistributionReport {
    pub fn collect(outcomes: impl IntoIterator<Item = TransactionOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                TransactionOutcome::Committed(signature) => report.successful.push(signature),
                TransactionOutcome::Failed {
                    batch_index,
                    reason,
                } => report.failed.push(BatchFailure {
                    batch_index,
                    reason,
                }),
            }
        }
        report.failed.sort_by_key(|f| f.batch_index);
        report
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// One line per batch, enough to reconcile failed batches by hand
    pub fn log(&self, cluster: &str) {
        for signature in &self.successful {
            info!("✅ Batch committed: {}", explorer_url(signature, cluster));
        }
        for failure in &self.failed {
            error!("❌ Batch {} failed: {}", failure.batch_index, failure.reason);
        }
        info!(
            "📊 Distribution finished: {} committed, {} failed",
            self.successful.len(),
            self.failed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_partitions_outcomes() {
        let committed = Signature::from([1u8; 64]);
        let report = DistributionReport::collect(vec![
            TransactionOutcome::Failed {
                batch_index: 2,
                reason: "lease expired".to_string(),
            },
            TransactionOutcome::Committed(committed),
            TransactionOutcome::Failed {
                batch_index: 0,
                reason: "rejected".to_string(),
            },
        ]);

        assert_eq!(report.successful, vec![committed]);
        assert_eq!(
            report.failed.iter().map(|f| f.batch_index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(report.batch_count(), 3);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_report_serializes_signatures_as_strings() {
        let signature = Signature::from([2u8; 64]);
        let report = DistributionReport::collect(vec![TransactionOutcome::Committed(signature)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["successful"][0], signature.to_string());
        assert!(json["failed"].as_array().unwrap().is_empty());
    }
}
