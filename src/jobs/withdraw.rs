use super::{Job, JobKind};
use crate::{
    error::{AppError, AppResult},
    execution::{
        explorer_url,
        instructions::{
            associated_token_address, create_associated_token_account_idempotent,
            token_2022_program_id, withdraw_withheld_tokens_from_accounts, withheld_transfer_fee,
        },
        LedgerClient,
    },
    payout::Broadcaster,
};
use async_trait::async_trait;
use solana_sdk::{
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct WithdrawSettings {
    pub mint: Pubkey,
    pub fee_vault_owner: Pubkey,
    pub batch_size: usize,
    /// Retries after the first attempt of each batch
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub cluster: String,
}

impl WithdrawSettings {
    pub fn new(mint: Pubkey, fee_vault_owner: Pubkey, cluster: impl Into<String>) -> Self {
        Self {
            mint,
            fee_vault_owner,
            batch_size: 20,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            cluster: cluster.into(),
        }
    }
}

/// Sweeps withheld Token-2022 transfer fees into the fee vault.
pub struct WithdrawJob {
    ledger: Arc<dyn LedgerClient>,
    broadcaster: Broadcaster,
    signer: Arc<Keypair>,
    settings: WithdrawSettings,
}

impl WithdrawJob {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        broadcaster: Broadcaster,
        signer: Arc<Keypair>,
        settings: WithdrawSettings,
    ) -> Self {
        Self {
            ledger,
            broadcaster,
            signer,
            settings,
        }
    }

    async fn submit(&self, instructions: &[Instruction]) -> AppResult<Signature> {
        let lease = self.ledger.latest_lease().await?;
        let payer = self.signer.pubkey();
        let message = Message::new_with_blockhash(instructions, Some(&payer), &lease.blockhash);
        let transaction = VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[self.signer.as_ref()])
            .map_err(|e| AppError::Internal(format!("Failed to sign withdrawal: {}", e)))?;

        Ok(self.broadcaster.broadcast(&transaction, &lease).await?)
    }

    async fn accounts_with_withheld_fees(&self) -> AppResult<Vec<Pubkey>> {
        let accounts = self
            .ledger
            .token_accounts_for_mint(&token_2022_program_id(), &self.settings.mint)
            .await?;

        Ok(accounts
            .into_iter()
            .filter(|(_, data)| withheld_transfer_fee(data).is_some_and(|amount| amount > 0))
            .map(|(pubkey, _)| pubkey)
            .collect())
    }

    /// Returns `None` once every attempt has failed
    async fn withdraw_batch(&self, index: usize, vault: &Pubkey, sources: &[Pubkey]) -> Option<Signature> {
        let mut attempt = 0u32;

        loop {
            let result = match withdraw_withheld_tokens_from_accounts(
                &self.settings.mint,
                vault,
                &self.signer.pubkey(),
                sources,
            ) {
                Ok(instruction) => self.submit(&[instruction]).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(signature) => return Some(signature),
                Err(e) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    warn!(
                        "⏳ Withdraw batch {} attempt {} failed: {}. Retrying in {:?}",
                        index + 1,
                        attempt,
                        e,
                        self.settings.retry_delay
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        "❌ Withdraw batch {} failed after {} attempts: {}",
                        index + 1,
                        attempt + 1,
                        e
                    );
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl Job for WithdrawJob {
    fn kind(&self) -> JobKind {
        JobKind::Withdraw
    }

    async fn run(&self) -> AppResult<()> {
        let payer = self.signer.pubkey();
        let token_program = token_2022_program_id();
        let vault = associated_token_address(&self.settings.fee_vault_owner, &self.settings.mint, &token_program);
        self.submit(&[create_associated_token_account_idempotent(
            &payer,
            &self.settings.fee_vault_owner,
            &self.settings.mint,
            &token_program,
        )])
        .await?;

        info!("🔍 Fetching accounts with withheld fees...");
        let sources = self.accounts_with_withheld_fees().await?;
        if sources.is_empty() {
            info!("💤 No accounts with withheld fees");
            return Ok(());
        }

        let batches: Vec<&[Pubkey]> = sources.chunks(self.settings.batch_size.max(1)).collect();
        info!(
            "🧾 Withdrawing from {} accounts in {} batches",
            sources.len(),
            batches.len()
        );

        let mut withdrawn = 0;
        for (index, batch) in batches.iter().enumerate() {
            if let Some(signature) = self.withdraw_batch(index, &vault, batch).await {
                withdrawn += 1;
                info!(
                    "✅ Withdraw batch {}/{} complete: {}",
                    index + 1,
                    batches.len(),
                    explorer_url(&signature, &self.settings.cluster)
                );
            }
        }

        info!("🧾 Fee collection finished: {}/{} batches", withdrawn, batches.len());
        Ok(())
    }
}
