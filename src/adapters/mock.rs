use super::jupiter::{SwapQuote, SwapTransaction, SwapVenue};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use solana_sdk::{
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    transaction::VersionedTransaction,
};

/// Swap venue that quotes a fixed output and records requested amounts
#[derive(Default)]
pub struct MockSwapVenue {
    pub out_amount: u64,
    pub fail_quotes: bool,
    pub quoted_amounts: Mutex<Vec<u64>>,
}

#[async_trait]
impl SwapVenue for MockSwapVenue {
    async fn quote(
        &self,
        _input_mint: &Pubkey,
        _output_mint: &Pubkey,
        amount: u64,
        _slippage_bps: u16,
    ) -> AppResult<SwapQuote> {
        if self.fail_quotes {
            return Err(AppError::Swap("No routes found".to_string()));
        }
        self.quoted_amounts.lock().push(amount);
        Ok(SwapQuote {
            in_amount: amount,
            out_amount: self.out_amount,
            raw: json!({}),
        })
    }

    async fn swap_transaction(&self, _quote: &SwapQuote, user: &Pubkey) -> AppResult<SwapTransaction> {
        let message = Message::new_with_blockhash(&[], Some(user), &Hash::new_unique());
        Ok(SwapTransaction {
            transaction: VersionedTransaction {
                signatures: vec![Default::default()],
                message: VersionedMessage::Legacy(message),
            },
            last_valid_block_height: 250,
        })
    }
}
