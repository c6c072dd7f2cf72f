use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{CommitmentConfig, RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::{num::NonZeroU32, path::Path};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult, LedgerError},
    execution::client::{ConfirmationStatus, Lease, LedgerClient},
};

/// `getMultipleAccounts` accepts at most this many keys per call
const MULTIPLE_ACCOUNTS_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    /// Client-side pacing of RPC calls, shared by every in-flight batch
    pub max_requests_per_second: u32,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            max_requests_per_second: 40,
        }
    }
}

/// `LedgerClient` backed by a Solana JSON-RPC endpoint
pub struct SolanaLedger {
    config: SolanaConfig,
    client: RpcClient,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SolanaLedger {
    pub fn new(config: SolanaConfig) -> Self {
        let client = RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment);
        let per_second = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(per_second));

        info!("🔗 Solana RPC client ready: {}", config.rpc_url);
        Self {
            config,
            client,
            limiter,
        }
    }

    async fn paced(&self) {
        self.limiter.until_ready().await;
    }
}

fn rpc_error(context: &str, e: impl std::fmt::Display) -> LedgerError {
    let message = format!("{}: {}", context, e);
    match LedgerError::classify_send_failure(message.clone()) {
        throttled @ LedgerError::RateLimited(_) => throttled,
        _ => LedgerError::Rpc(message),
    }
}

#[async_trait]
impl LedgerClient for SolanaLedger {
    async fn recent_prioritization_fees(&self) -> Result<Vec<u64>, LedgerError> {
        self.paced().await;
        let samples = self
            .client
            .get_recent_prioritization_fees(&[])
            .await
            .map_err(|e| rpc_error("Failed to get prioritization fees", e))?;

        Ok(samples.into_iter().map(|s| s.prioritization_fee).collect())
    }

    async fn latest_lease(&self) -> Result<Lease, LedgerError> {
        self.paced().await;
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.config.commitment)
            .await
            .map_err(|e| rpc_error("Failed to get blockhash", e))?;

        Ok(Lease {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature, LedgerError> {
        self.paced().await;
        let config = RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(self.config.commitment.commitment),
            ..Default::default()
        };

        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| LedgerError::classify_send_failure(format!("Send failed: {}", e)))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<ConfirmationStatus, LedgerError> {
        self.paced().await;
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| rpc_error("Failed to get signature status", e))?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(ConfirmationStatus::Pending),
        };

        if let Some(err) = status.err {
            return Ok(ConfirmationStatus::Failed(format!("{:?}", err)));
        }

        if status.satisfies_commitment(self.config.commitment) {
            Ok(ConfirmationStatus::Confirmed)
        } else {
            Ok(ConfirmationStatus::Pending)
        }
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.paced().await;
        self.client
            .get_block_height_with_commitment(self.config.commitment)
            .await
            .map_err(|e| rpc_error("Failed to get block height", e))
    }

    async fn token_account_balance(&self, account: &Pubkey) -> Result<u64, LedgerError> {
        self.paced().await;
        let balance = self
            .client
            .get_token_account_balance(account)
            .await
            .map_err(|e| rpc_error("Failed to get token balance", e))?;

        balance
            .amount
            .parse::<u64>()
            .map_err(|e| LedgerError::Rpc(format!("Invalid token amount '{}': {}", balance.amount, e)))
    }

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64, LedgerError> {
        self.paced().await;
        let supply = self
            .client
            .get_token_supply(mint)
            .await
            .map_err(|e| rpc_error("Failed to get token supply", e))?;

        supply
            .amount
            .parse::<u64>()
            .map_err(|e| LedgerError::Rpc(format!("Invalid token supply '{}': {}", supply.amount, e)))
    }

    async fn token_accounts_for_mint(
        &self,
        program_id: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError> {
        self.paced().await;
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                0,
                mint.as_ref(),
            ))]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.config.commitment),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .client
            .get_program_ui_accounts_with_config(program_id, config)
            .await
            .map_err(|e| rpc_error("Failed to get program accounts", e))?;

        debug!("Found {} accounts for mint {}", accounts.len(), mint);
        Ok(accounts
            .into_iter()
            .filter_map(|(pubkey, account)| match account.data.decode() {
                Some(data) => Some((pubkey, data)),
                None => {
                    warn!("Skipping account {} with undecodable data", pubkey);
                    None
                }
            })
            .collect())
    }

    async fn lamport_balances(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError> {
        let mut balances = Vec::with_capacity(accounts.len());

        for chunk in accounts.chunks(MULTIPLE_ACCOUNTS_LIMIT) {
            self.paced().await;
            let infos = self
                .client
                .get_multiple_accounts(chunk)
                .await
                .map_err(|e| rpc_error("Failed to get accounts", e))?;
            balances.extend(infos.into_iter().map(|info| info.map_or(0, |account| account.lamports)));
        }

        Ok(balances)
    }
}

/// Load the signing credential: a JSON array of the 64 secret key bytes.
pub async fn load_keypair(path: impl AsRef<Path>) -> AppResult<Keypair> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Credential(format!("Wallet file {} not readable: {}", path.display(), e))
    })?;

    let bytes: Vec<u8> = serde_json::from_str(&raw).map_err(|e| {
        AppError::Credential(format!("Wallet file {} is not a byte array: {}", path.display(), e))
    })?;

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| AppError::Credential(format!("Invalid keypair in {}: {}", path.display(), e)))
}

/// Solscan link for a committed signature
pub fn explorer_url(signature: &Signature, cluster: &str) -> String {
    format!("https://solscan.io/tx/{}?cluster={}", signature, cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_load_keypair_roundtrips_secret_bytes() {
        let keypair = Keypair::new();
        let path = std::env::temp_dir().join(format!("wallet-{}.json", Uuid::new_v4()));
        let body = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        tokio::fs::write(&path, body).await.unwrap();

        let loaded = load_keypair(&path).await.unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_load_keypair_missing_file() {
        let result = load_keypair("/nonexistent/wallet.json").await;
        assert!(matches!(result, Err(AppError::Credential(_))));
    }

    #[test]
    fn test_rpc_error_keeps_throttling_class() {
        assert!(rpc_error("get blockhash", "429 Too Many Requests").is_rate_limited());
        assert_eq!(
            rpc_error("get blockhash", "connection reset"),
            LedgerError::Rpc("get blockhash: connection reset".to_string())
        );
    }

    #[test]
    fn test_explorer_url() {
        let signature = Signature::default();
        assert_eq!(
            explorer_url(&signature, "mainnet"),
            format!("https://solscan.io/tx/{}?cluster=mainnet", signature)
        );
    }
}
