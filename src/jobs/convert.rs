use super::distribute::sol_to_lamports;
use super::{Job, JobKind};
use crate::{
    accumulator::AccumulatorStore,
    adapters::SwapVenue,
    error::{AppError, AppResult},
    execution::{
        instructions::{associated_token_address, native_mint},
        Lease, LedgerClient,
    },
    payout::{Broadcaster, PayoutDistributor},
    recipients::RecipientShare,
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer, transaction::VersionedTransaction};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub mint: Pubkey,
    pub token_program: Pubkey,
    pub decimals: u8,
    /// Whole tokens that are never sold
    pub initial_balance: u64,
    /// Share of the sellable balance sold per run; outside (0, 100] sells everything
    pub percentage_sell: Decimal,
    pub slippage_bps: u16,
}

/// Fixed cut of every conversion paid straight to treasury wallets
pub struct TreasurySplit {
    pub percent: Decimal,
    pub recipients: Vec<RecipientShare>,
    pub distributor: Arc<PayoutDistributor>,
}

/// Raw token amount to sell out of `balance`, keeping `kept` back.
pub fn sell_amount(balance: u64, kept: u64, percentage_sell: Decimal) -> u64 {
    let available = balance.saturating_sub(kept);
    if percentage_sell > Decimal::ZERO && percentage_sell <= Decimal::ONE_HUNDRED {
        (Decimal::from(available) * percentage_sell / Decimal::ONE_HUNDRED)
            .floor()
            .to_u64()
            .unwrap_or(0)
    } else {
        available
    }
}

/// Sells collected sale tokens for SOL and credits the proceeds to the accumulator.
pub struct ConvertJob {
    ledger: Arc<dyn LedgerClient>,
    venue: Arc<dyn SwapVenue>,
    broadcaster: Broadcaster,
    signer: Arc<Keypair>,
    accumulator: Arc<AccumulatorStore>,
    settings: ConvertSettings,
    treasury: Option<TreasurySplit>,
}

impl ConvertJob {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        venue: Arc<dyn SwapVenue>,
        broadcaster: Broadcaster,
        signer: Arc<Keypair>,
        accumulator: Arc<AccumulatorStore>,
        settings: ConvertSettings,
    ) -> Self {
        Self {
            ledger,
            venue,
            broadcaster,
            signer,
            accumulator,
            settings,
            treasury: None,
        }
    }

    pub fn with_treasury(mut self, treasury: TreasurySplit) -> Self {
        self.treasury = Some(treasury);
        self
    }

    fn kept_raw(&self) -> u64 {
        10u64
            .checked_pow(self.settings.decimals as u32)
            .and_then(|unit| unit.checked_mul(self.settings.initial_balance))
            .unwrap_or(u64::MAX)
    }

    /// Sell and return the SOL received
    async fn sell(&self, amount: u64) -> AppResult<Decimal> {
        let owner = self.signer.pubkey();
        let quote = self
            .venue
            .quote(&self.settings.mint, &native_mint(), amount, self.settings.slippage_bps)
            .await?;
        let swap = self.venue.swap_transaction(&quote, &owner).await?;

        let lease = Lease {
            blockhash: *swap.transaction.message.recent_blockhash(),
            last_valid_block_height: swap.last_valid_block_height,
        };
        let signed = VersionedTransaction::try_new(swap.transaction.message, &[self.signer.as_ref()])
            .map_err(|e| AppError::Swap(format!("Failed to sign swap: {}", e)))?;

        let signature = self.broadcaster.broadcast(&signed, &lease).await?;
        info!("✅ Swap confirmed: {}", signature);

        Ok(Decimal::from(quote.out_amount) / Decimal::from(1_000_000_000u64))
    }

    /// Pay the treasury cut and return what is left for distribution.
    /// A failed treasury payout is logged and never blocks the remainder.
    async fn split_treasury(&self, received: Decimal) -> Decimal {
        let Some(treasury) = &self.treasury else {
            return received;
        };
        if treasury.percent <= Decimal::ZERO || treasury.recipients.is_empty() {
            return received;
        }

        let cut = received * treasury.percent / Decimal::ONE_HUNDRED;
        match sol_to_lamports(cut) {
            Ok(0) => {}
            Ok(lamports) => match treasury.distributor.distribute(lamports, &treasury.recipients).await {
                Ok(report) => info!(
                    "🏦 Treasury split of {} SOL: {} batches committed",
                    cut,
                    report.successful.len()
                ),
                Err(e) => error!("❌ Treasury split of {} SOL failed: {}", cut, e),
            },
            Err(e) => error!("❌ Invalid treasury amount: {}", e),
        }

        received - cut
    }
}

#[async_trait]
impl Job for ConvertJob {
    fn kind(&self) -> JobKind {
        JobKind::Convert
    }

    async fn run(&self) -> AppResult<()> {
        let account = associated_token_address(
            &self.signer.pubkey(),
            &self.settings.mint,
            &self.settings.token_program,
        );
        let balance = self.ledger.token_account_balance(&account).await?;
        let amount = sell_amount(balance, self.kept_raw(), self.settings.percentage_sell);

        if amount == 0 {
            info!("💤 No sellable balance ({} raw held)", balance);
            return Ok(());
        }

        info!("💱 Selling {} of {} raw tokens", amount, balance);
        let received = self.sell(amount).await?;
        let distributable = self.split_treasury(received).await;

        let total = self.accumulator.add(distributable).await?;
        info!(
            "💰 Sold for {} SOL, {} accumulated for distribution",
            received, total
        );
        Ok(())
    }
}
