use crate::adapters::JUPITER_V6_API;
use crate::jobs::JobKind;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "helius_rpc_url", alias = "solana_rpc_url", default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(rename = "solana_cluster", default = "default_cluster")]
    pub cluster: String,
    #[serde(default = "default_wallet_file")]
    pub wallet_file: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_accumulator_file")]
    pub accumulator_file: String,
    #[serde(default = "default_distribution_program_id")]
    pub distribution_program_id: String,

    // Sale token
    #[serde(default)]
    pub token_mint_address: Option<String>,
    #[serde(default)]
    pub fee_vault_owner: Option<String>,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default)]
    pub initial_balance: u64,
    #[serde(default)]
    pub percentage_sell: Decimal,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default = "default_jupiter_api_url")]
    pub jupiter_api_url: String,

    // Treasury split applied to every conversion
    #[serde(default)]
    pub treasury_split_percent: Decimal,
    #[serde(default)]
    pub treasury_recipients: String,

    // Cadences, in milliseconds
    #[serde(rename = "fetch_holders_interval", default = "default_fetch_holders_interval")]
    pub fetch_holders_interval_ms: u64,
    #[serde(rename = "withdraw_interval", default = "default_withdraw_interval")]
    pub withdraw_interval_ms: u64,
    #[serde(rename = "sell_interval", default = "default_sell_interval")]
    pub sell_interval_ms: u64,
    #[serde(rename = "distribute_interval", default = "default_distribute_interval")]
    pub distribute_interval_ms: u64,
    #[serde(rename = "health_check_interval", default = "default_health_check_interval")]
    pub health_check_interval_ms: u64,
    #[serde(rename = "watchdog_interval", default = "default_watchdog_interval")]
    pub watchdog_interval_ms: u64,

    #[serde(default = "default_env_file")]
    pub env_file: String,
}

/// Job cadences, the part of the configuration that can change at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobIntervals {
    pub fetch_holders: Duration,
    pub withdraw: Duration,
    pub convert: Duration,
    pub distribute: Duration,
    pub health_check: Duration,
    pub watchdog: Duration,
}

impl Default for JobIntervals {
    fn default() -> Self {
        Self {
            fetch_holders: Duration::from_millis(default_fetch_holders_interval()),
            withdraw: Duration::from_millis(default_withdraw_interval()),
            convert: Duration::from_millis(default_sell_interval()),
            distribute: Duration::from_millis(default_distribute_interval()),
            health_check: Duration::from_millis(default_health_check_interval()),
            watchdog: Duration::from_millis(default_watchdog_interval()),
        }
    }
}

impl JobIntervals {
    pub fn for_job(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::FetchHolders => self.fetch_holders,
            JobKind::Withdraw => self.withdraw,
            JobKind::Convert => self.convert,
            JobKind::Distribute => self.distribute,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let intervals = [
            ("FETCH_HOLDERS_INTERVAL", self.fetch_holders_interval_ms),
            ("WITHDRAW_INTERVAL", self.withdraw_interval_ms),
            ("SELL_INTERVAL", self.sell_interval_ms),
            ("DISTRIBUTE_INTERVAL", self.distribute_interval_ms),
            ("HEALTH_CHECK_INTERVAL", self.health_check_interval_ms),
            ("WATCHDOG_INTERVAL", self.watchdog_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(config::ConfigError::Message(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.percentage_sell < Decimal::ZERO || self.percentage_sell > Decimal::ONE_HUNDRED {
            return Err(config::ConfigError::Message(format!(
                "PERCENTAGE_SELL must be within 0..=100, got {}",
                self.percentage_sell
            )));
        }

        if self.treasury_split_percent < Decimal::ZERO
            || self.treasury_split_percent > Decimal::ONE_HUNDRED
        {
            return Err(config::ConfigError::Message(format!(
                "TREASURY_SPLIT_PERCENT must be within 0..=100, got {}",
                self.treasury_split_percent
            )));
        }

        Ok(())
    }

    pub fn intervals(&self) -> JobIntervals {
        JobIntervals {
            fetch_holders: Duration::from_millis(self.fetch_holders_interval_ms),
            withdraw: Duration::from_millis(self.withdraw_interval_ms),
            convert: Duration::from_millis(self.sell_interval_ms),
            distribute: Duration::from_millis(self.distribute_interval_ms),
            health_check: Duration::from_millis(self.health_check_interval_ms),
            watchdog: Duration::from_millis(self.watchdog_interval_ms),
        }
    }
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_cluster() -> String {
    "mainnet".to_string()
}

fn default_wallet_file() -> String {
    "wallet.json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost/revshare".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_accumulator_file() -> String {
    "accumulated_sol.json".to_string()
}

fn default_distribution_program_id() -> String {
    "75VwsLZCFLbPsdfMAHs12AUtjy4Q9P48ESVLiUbEPE29".to_string()
}

fn default_token_decimals() -> u8 {
    9
}

fn default_slippage_bps() -> u16 {
    1000
}

fn default_jupiter_api_url() -> String {
    JUPITER_V6_API.to_string()
}

fn default_fetch_holders_interval() -> u64 {
    180_000
}

fn default_withdraw_interval() -> u64 {
    20_000
}

fn default_sell_interval() -> u64 {
    30_000
}

fn default_distribute_interval() -> u64 {
    300_000
}

fn default_health_check_interval() -> u64 {
    60_000
}

fn default_watchdog_interval() -> u64 {
    60_000
}

fn default_env_file() -> String {
    ".env".to_string()
}
