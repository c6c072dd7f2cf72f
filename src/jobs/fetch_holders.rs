use super::{Job, JobKind};
use crate::{
    error::{AppError, AppResult},
    execution::{
        instructions::{token_2022_program_id, token_holding},
        LedgerClient,
    },
    recipients::{RecipientShare, ShareStore},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Percentages are stored with this many decimal places
const PERCENTAGE_DP: u32 = 6;

/// A wallet's combined balance across its token accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub owner: Pubkey,
    pub amount: u64,
}

/// Sum non-zero balances per owner, largest first
pub fn aggregate_holdings(accounts: &[(Pubkey, Vec<u8>)]) -> Vec<Holding> {
    let mut by_owner: HashMap<Pubkey, u64> = HashMap::new();
    let mut unreadable = 0;

    for (address, data) in accounts {
        match token_holding(data) {
            Some((_, 0)) => {}
            Some((owner, amount)) => {
                let total = by_owner.entry(owner).or_default();
                *total = total.saturating_add(amount);
            }
            None => {
                debug!("Skipping unreadable token account {}", address);
                unreadable += 1;
            }
        }
    }
    if unreadable > 0 {
        warn!("⚠️ Skipped {} unreadable token accounts", unreadable);
    }

    let mut holdings: Vec<Holding> = by_owner
        .into_iter()
        .map(|(owner, amount)| Holding { owner, amount })
        .collect();
    holdings.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.owner.to_string().cmp(&b.owner.to_string()))
    });
    holdings
}

/// `amount / supply * 100`, rounded to six places. Holdings that round to
/// zero are dropped.
pub fn to_shares(holdings: &[Holding], supply: u64) -> AppResult<Vec<RecipientShare>> {
    if supply == 0 {
        return Err(AppError::InvalidInput("mint supply is zero".to_string()));
    }
    let supply = Decimal::from(supply);

    Ok(holdings
        .iter()
        .filter_map(|holding| {
            let percentage =
                (Decimal::from(holding.amount) / supply * Decimal::ONE_HUNDRED).round_dp(PERCENTAGE_DP);
            RecipientShare::new(holding.owner, percentage).ok()
        })
        .collect())
}

/// Rebuilds the recipient snapshot from the sale mint's current holders.
pub struct FetchHoldersJob {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ShareStore>,
    mint: Pubkey,
}

impl FetchHoldersJob {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn ShareStore>, mint: Pubkey) -> Self {
        Self { ledger, store, mint }
    }

    /// Drop wallets without any SOL; they cannot be paid out to
    async fn funded(&self, holdings: Vec<Holding>) -> AppResult<Vec<Holding>> {
        let owners: Vec<Pubkey> = holdings.iter().map(|holding| holding.owner).collect();
        let lamports = self.ledger.lamport_balances(&owners).await?;

        let funded: Vec<Holding> = holdings
            .into_iter()
            .zip(lamports)
            .filter(|(_, lamports)| *lamports > 0)
            .map(|(holding, _)| holding)
            .collect();

        let dropped = owners.len() - funded.len();
        if dropped > 0 {
            info!("🪙 Dropped {} holders without a SOL balance", dropped);
        }
        Ok(funded)
    }
}

#[async_trait]
impl Job for FetchHoldersJob {
    fn kind(&self) -> JobKind {
        JobKind::FetchHolders
    }

    async fn run(&self) -> AppResult<()> {
        info!("👥 Fetching holders of {}...", self.mint);

        let supply = self.ledger.token_supply(&self.mint).await?;
        let accounts = self
            .ledger
            .token_accounts_for_mint(&token_2022_program_id(), &self.mint)
            .await?;

        let holdings = aggregate_holdings(&accounts);
        info!(
            "👥 {} token accounts, {} holders with a balance",
            accounts.len(),
            holdings.len()
        );

        let holdings = self.funded(holdings).await?;
        let shares = to_shares(&holdings, supply)?;
        if shares.is_empty() {
            // an empty scan is more likely an RPC hiccup than a real state
            warn!("⚠️ No eligible holders found, keeping the previous snapshot");
            return Ok(());
        }

        self.store.replace_shares(&shares).await?;
        info!("✅ Recipient snapshot refreshed: {} holders", shares.len());
        Ok(())
    }
}
