use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::time::Duration;
use tracing::{debug, info};

pub const JUPITER_V6_API: &str = "https://quote-api.jup.ag/v6";

/// Quote as returned by the venue. `raw` is echoed back verbatim when
/// requesting the swap transaction.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub raw: Value,
}

/// Unsigned swap transaction plus the height after which it can no longer land
#[derive(Debug, Clone)]
pub struct SwapTransaction {
    pub transaction: VersionedTransaction,
    pub last_valid_block_height: u64,
}

#[async_trait]
pub trait SwapVenue: Send + Sync {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> AppResult<SwapQuote>;

    async fn swap_transaction(&self, quote: &SwapQuote, user: &Pubkey) -> AppResult<SwapTransaction>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    last_valid_block_height: u64,
}

pub struct JupiterClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("revshare-distributor/0.1"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn read_json(response: reqwest::Response) -> AppResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Swap(format!("Jupiter API error ({}): {}", status, body)));
        }
        Ok(response.json().await?)
    }
}

fn amount_field(value: &Value, field: &str) -> AppResult<u64> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| AppError::Swap(format!("Quote is missing a valid {}", field)))
}

pub fn parse_quote(raw: Value) -> AppResult<SwapQuote> {
    if let Some(error) = raw.get("error").and_then(Value::as_str) {
        return Err(AppError::Swap(format!("Quote rejected: {}", error)));
    }

    Ok(SwapQuote {
        in_amount: amount_field(&raw, "inAmount")?,
        out_amount: amount_field(&raw, "outAmount")?,
        raw,
    })
}

/// Base64 wire transaction -> `VersionedTransaction`
pub fn decode_transaction(encoded: &str) -> AppResult<VersionedTransaction> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| AppError::Swap(format!("Swap transaction is not base64: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| AppError::Swap(format!("Failed to deserialize swap transaction: {}", e)))
}

#[async_trait]
impl SwapVenue for JupiterClient {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> AppResult<SwapQuote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps
        );
        debug!("Requesting quote: {}", url);

        let response = self.http_client.get(&url).send().await?;
        let quote = parse_quote(Self::read_json(response).await?)?;

        info!(
            "💱 Quote: {} {} -> {} {}",
            quote.in_amount, input_mint, quote.out_amount, output_mint
        );
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &SwapQuote, user: &Pubkey) -> AppResult<SwapTransaction> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": "auto",
        });

        let response = self
            .http_client
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await?;

        let swap: SwapResponse = serde_json::from_value(Self::read_json(response).await?)
            .map_err(|e| AppError::Swap(format!("Unexpected swap response: {}", e)))?;

        Ok(SwapTransaction {
            transaction: decode_transaction(&swap.swap_transaction)?,
            last_valid_block_height: swap.last_valid_block_height,
        })
    }
}
