// In-memory ledger used by the payout and job tests.

use crate::error::LedgerError;
use crate::execution::client::{ConfirmationStatus, Lease, LedgerClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::time::Instant;

/// Ledger calls in the order they reached the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCall {
    Lease,
    Send,
}

pub struct MockLedger {
    pub fee_samples: Vec<u64>,
    /// Errors returned by the next sends, in order, before sends start succeeding
    pub send_errors: Mutex<VecDeque<LedgerError>>,
    /// Any transaction touching this account is rejected outright
    pub reject_account: Mutex<Option<Pubkey>>,
    /// Transactions touching the account are throttled this many times
    pub throttle_account: Mutex<Option<(Pubkey, usize)>>,
    pub status: Mutex<ConfirmationStatus>,
    /// Statuses returned by the next polls before falling back to `status`
    pub status_sequence: Mutex<VecDeque<ConfirmationStatus>>,
    pub fail_leases: bool,
    pub block_height: AtomicU64,
    pub block_height_errors: Mutex<VecDeque<LedgerError>>,
    pub last_valid_block_height: u64,
    pub token_balance: u64,
    pub token_supply: u64,
    pub token_accounts: Vec<(Pubkey, Vec<u8>)>,
    /// Wallets reported with zero lamports
    pub unfunded: HashSet<Pubkey>,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    /// Clock reading at each accepted send, alongside `sent`
    pub sent_at: Mutex<Vec<Instant>>,
    pub calls: Mutex<Vec<LedgerCall>>,
    pub send_attempts: AtomicUsize,
    pub lease_requests: AtomicUsize,
    pub status_polls: AtomicUsize,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            fee_samples: vec![],
            send_errors: Mutex::new(VecDeque::new()),
            reject_account: Mutex::new(None),
            throttle_account: Mutex::new(None),
            status: Mutex::new(ConfirmationStatus::Confirmed),
            status_sequence: Mutex::new(VecDeque::new()),
            fail_leases: false,
            block_height: AtomicU64::new(100),
            block_height_errors: Mutex::new(VecDeque::new()),
            last_valid_block_height: 250,
            token_balance: 0,
            token_supply: 0,
            token_accounts: vec![],
            unfunded: HashSet::new(),
            sent: Mutex::new(vec![]),
            sent_at: Mutex::new(vec![]),
            calls: Mutex::new(vec![]),
            send_attempts: AtomicUsize::new(0),
            lease_requests: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
        }
    }
}

impl MockLedger {
    pub fn with_send_errors(self, errors: Vec<LedgerError>) -> Self {
        *self.send_errors.lock() = errors.into();
        self
    }

    pub fn rejecting(self, account: Pubkey) -> Self {
        *self.reject_account.lock() = Some(account);
        self
    }

    pub fn throttling(self, account: Pubkey, times: usize) -> Self {
        *self.throttle_account.lock() = Some((account, times));
        self
    }

    pub fn with_status(self, status: ConfirmationStatus) -> Self {
        *self.status.lock() = status;
        self
    }

    pub fn with_status_sequence(self, statuses: Vec<ConfirmationStatus>) -> Self {
        *self.status_sequence.lock() = statuses.into();
        self
    }

    pub fn with_block_height_errors(self, errors: Vec<LedgerError>) -> Self {
        *self.block_height_errors.lock() = errors.into();
        self
    }

    /// Recipient count per committed payout transaction, in send order
    pub fn sent_recipient_counts(&self) -> Vec<usize> {
        self.sent
            .lock()
            .iter()
            .map(|tx| {
                let message = &tx.message;
                let payout = message
                    .instructions()
                    .last()
                    .map(|ix| ix.accounts.len())
                    .unwrap_or(0);
                // funding account + system program
                payout.saturating_sub(2)
            })
            .collect()
    }
}

/// Initialized Token-2022 account bytes, optionally carrying a
/// `TransferFeeAmount` extension after an `ImmutableOwner` one
pub fn token_account_data(owner: &Pubkey, amount: u64, withheld: Option<u64>) -> Vec<u8> {
    let mut data = vec![0u8; 165];
    data[0..32].copy_from_slice(Pubkey::new_unique().as_ref());
    data[32..64].copy_from_slice(owner.as_ref());
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data[108] = 1; // AccountState::Initialized

    if let Some(withheld) = withheld {
        data.push(2); // AccountType::Account
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(&withheld.to_le_bytes());
    }
    data
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn recent_prioritization_fees(&self) -> Result<Vec<u64>, LedgerError> {
        Ok(self.fee_samples.clone())
    }

    async fn latest_lease(&self) -> Result<Lease, LedgerError> {
        self.calls.lock().push(LedgerCall::Lease);
        let n = self.lease_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_leases {
            return Err(LedgerError::Rpc("blockhash unavailable".to_string()));
        }
        Ok(Lease {
            blockhash: Hash::new_from_array([(n % 255) as u8 + 1; 32]),
            last_valid_block_height: self.last_valid_block_height,
        })
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        _skip_preflight: bool,
    ) -> Result<Signature, LedgerError> {
        self.calls.lock().push(LedgerCall::Send);
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.send_errors.lock().pop_front() {
            return Err(err);
        }

        let keys = transaction.message.static_account_keys();
        if let Some(rejected) = *self.reject_account.lock() {
            if keys.contains(&rejected) {
                return Err(LedgerError::Rejected("invalid account data".to_string()));
            }
        }

        if let Some((account, remaining)) = self.throttle_account.lock().as_mut() {
            if *remaining > 0 && keys.contains(account) {
                *remaining -= 1;
                return Err(LedgerError::RateLimited("429 Too Many Requests".to_string()));
            }
        }

        self.sent.lock().push(transaction.clone());
        self.sent_at.lock().push(Instant::now());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<ConfirmationStatus, LedgerError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        // every poll advances the chain by one block
        self.block_height.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.status_sequence.lock().pop_front() {
            return Ok(status);
        }
        Ok(self.status.lock().clone())
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        if let Some(err) = self.block_height_errors.lock().pop_front() {
            return Err(err);
        }
        Ok(self.block_height.load(Ordering::SeqCst))
    }

    async fn token_account_balance(&self, _account: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self.token_balance)
    }

    async fn token_supply(&self, _mint: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self.token_supply)
    }

    async fn token_accounts_for_mint(
        &self,
        _program_id: &Pubkey,
        _mint: &Pubkey,
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError> {
        Ok(self.token_accounts.clone())
    }

    async fn lamport_balances(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError> {
        Ok(accounts
            .iter()
            .map(|account| if self.unfunded.contains(account) { 0 } else { 1_000_000 })
            .collect())
    }
}
