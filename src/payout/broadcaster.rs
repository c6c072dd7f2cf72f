use crate::{
    error::LedgerError,
    execution::client::{ConfirmationStatus, Lease, LedgerClient},
};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BroadcastPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub skip_preflight: bool,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_attempts: 25,
            poll_interval: Duration::from_millis(500),
            skip_preflight: true,
        }
    }
}

impl BroadcastPolicy {
    /// `min(base * 2^attempt, max)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Submits signed transactions and waits for them to land.
pub struct Broadcaster {
    ledger: Arc<dyn LedgerClient>,
    policy: BroadcastPolicy,
}

impl Broadcaster {
    pub fn new(ledger: Arc<dyn LedgerClient>, policy: BroadcastPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Submit, retrying only rate-limit rejections.
    pub async fn send_with_backoff(&self, transaction: &VersionedTransaction) -> Result<Signature, LedgerError> {
        let mut attempt = 0u32;

        loop {
            match self
                .ledger
                .send_transaction(transaction, self.policy.skip_preflight)
                .await
            {
                Ok(signature) => return Ok(signature),
                Err(e) if e.is_rate_limited() => {
                    if attempt + 1 >= self.policy.max_attempts {
                        return Err(LedgerError::RetriesExhausted {
                            attempts: attempt + 1,
                        });
                    }

                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        "⏳ Rate limited (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        self.policy.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll until confirmed, failed on chain, or the lease has expired.
    ///
    /// A transaction already accepted by the node is still in flight, so
    /// transient poll failures are waited out. Only `max_attempts`
    /// consecutive block height failures end the wait.
    pub async fn await_confirmation(&self, signature: &Signature, lease: &Lease) -> Result<(), LedgerError> {
        let mut height_failures = 0u32;

        loop {
            match self.ledger.signature_status(signature).await {
                Ok(ConfirmationStatus::Confirmed) => return Ok(()),
                Ok(ConfirmationStatus::Failed(reason)) => return Err(LedgerError::FailedOnChain(reason)),
                Ok(ConfirmationStatus::Pending) => {}
                Err(e) => debug!("Status poll for {} failed: {}", signature, e),
            }

            match self.ledger.block_height().await {
                Ok(height) if height > lease.last_valid_block_height => {
                    return Err(LedgerError::LeaseExpired {
                        last_valid_block_height: lease.last_valid_block_height,
                    });
                }
                Ok(_) => height_failures = 0,
                Err(e) => {
                    height_failures += 1;
                    if height_failures >= self.policy.max_attempts {
                        return Err(e);
                    }
                    debug!("Block height poll for {} failed: {}", signature, e);
                }
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    pub async fn broadcast(&self, transaction: &VersionedTransaction, lease: &Lease) -> Result<Signature, LedgerError> {
        let signature = self.send_with_backoff(transaction).await?;
        debug!("Submitted {}, awaiting confirmation", signature);
        self.await_confirmation(&signature, lease).await?;
        Ok(signature)
    }
}
