use crate::error::LedgerError;
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

/// Ledger-state lease: a recent blockhash plus the last block height at which
/// a transaction carrying it can still land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Status of a submitted signature at "confirmed" commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// The ledger seam. Everything the jobs need from the chain goes through
/// here so the payout path can be exercised without a live node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Recent prioritization fee samples, in micro-lamports per compute unit
    async fn recent_prioritization_fees(&self) -> Result<Vec<u64>, LedgerError>;

    async fn latest_lease(&self) -> Result<Lease, LedgerError>;

    /// Submit a signed transaction. Failures must be classified so that
    /// throttling surfaces as `LedgerError::RateLimited`.
    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        skip_preflight: bool,
    ) -> Result<Signature, LedgerError>;

    async fn signature_status(&self, signature: &Signature) -> Result<ConfirmationStatus, LedgerError>;

    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Raw token amount held by a token account
    async fn token_account_balance(&self, account: &Pubkey) -> Result<u64, LedgerError>;

    /// Raw supply of a mint
    async fn token_supply(&self, mint: &Pubkey) -> Result<u64, LedgerError>;

    /// All accounts owned by `program_id` whose first 32 bytes equal `mint`
    async fn token_accounts_for_mint(
        &self,
        program_id: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError>;

    /// Lamports held by each account, in input order; missing accounts hold 0
    async fn lamport_balances(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError>;
}
