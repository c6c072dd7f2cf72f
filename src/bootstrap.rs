use std::{str::FromStr, sync::Arc, time::Duration};

use solana_sdk::{pubkey::Pubkey, signer::Signer};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    accumulator::AccumulatorStore,
    adapters::JupiterClient,
    config::Config,
    error::{AppError, AppResult},
    execution::{instructions::token_2022_program_id, load_keypair, LedgerClient, SolanaConfig, SolanaLedger},
    jobs::{
        ConvertJob, ConvertSettings, DistributeJob, FetchHoldersJob, Job, TreasurySplit, WithdrawJob,
        WithdrawSettings,
    },
    payout::{BroadcastPolicy, Broadcaster, PayoutDistributor},
    recipients::{models::parse_share_list, PgShareProvider},
    scheduler::{RetryPolicy, Scheduler},
};

/// Everything the service holds for its lifetime, built once at startup
pub struct AppContext {
    pub pool: PgPool,
    pub accumulator: Arc<AccumulatorStore>,
    pub scheduler: Arc<Scheduler>,
}

fn parse_pubkey(name: &str, value: &str) -> AppResult<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|e| AppError::Config(format!("{} is not a valid address '{}': {}", name, value, e)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Sends that should be simulated first
fn preflight_policy() -> BroadcastPolicy {
    BroadcastPolicy {
        skip_preflight: false,
        ..Default::default()
    }
}

pub async fn initialize_app_context(config: &Config) -> AppResult<AppContext> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;

    let signer = Arc::new(load_keypair(&config.wallet_file).await?);
    info!("🔑 Signer loaded: {}", signer.pubkey());

    let ledger: Arc<dyn LedgerClient> = Arc::new(SolanaLedger::new(SolanaConfig {
        rpc_url: config.rpc_url.clone(),
        ..Default::default()
    }));

    let accumulator = Arc::new(AccumulatorStore::open(&config.accumulator_file).await);
    info!(
        "💰 Accumulator loaded from {}: {} SOL",
        config.accumulator_file,
        accumulator.balance().await
    );

    let program_id = parse_pubkey("DISTRIBUTION_PROGRAM_ID", &config.distribution_program_id)?;
    let distributor = Arc::new(PayoutDistributor::new(
        ledger.clone(),
        signer.clone(),
        program_id,
        BroadcastPolicy::default(),
        config.cluster.clone(),
    ));

    let shares = Arc::new(PgShareProvider::new(pool.clone()));
    let mut jobs: Vec<Arc<dyn Job>> = Vec::new();

    if let Some(mint) = non_empty(&config.token_mint_address) {
        let mint = parse_pubkey("TOKEN_MINT_ADDRESS", mint)?;
        let fee_vault_owner = match non_empty(&config.fee_vault_owner) {
            Some(owner) => parse_pubkey("FEE_VAULT_OWNER", owner)?,
            None => signer.pubkey(),
        };

        jobs.push(Arc::new(FetchHoldersJob::new(ledger.clone(), shares.clone(), mint)));
        info!("✅ Holder refresh job registered");

        jobs.push(Arc::new(WithdrawJob::new(
            ledger.clone(),
            Broadcaster::new(ledger.clone(), preflight_policy()),
            signer.clone(),
            WithdrawSettings::new(mint, fee_vault_owner, config.cluster.clone()),
        )));
        info!("✅ Withdraw job registered (fee vault owner {})", fee_vault_owner);

        let mut convert = ConvertJob::new(
            ledger.clone(),
            Arc::new(JupiterClient::new(config.jupiter_api_url.clone())?),
            Broadcaster::new(ledger.clone(), preflight_policy()),
            signer.clone(),
            accumulator.clone(),
            ConvertSettings {
                mint,
                token_program: token_2022_program_id(),
                decimals: config.token_decimals,
                initial_balance: config.initial_balance,
                percentage_sell: config.percentage_sell,
                slippage_bps: config.slippage_bps,
            },
        );

        let treasury_recipients = parse_share_list(&config.treasury_recipients)?;
        if !config.treasury_split_percent.is_zero() && !treasury_recipients.is_empty() {
            info!(
                "🏦 Treasury split: {}% to {} wallets",
                config.treasury_split_percent,
                treasury_recipients.len()
            );
            convert = convert.with_treasury(TreasurySplit {
                percent: config.treasury_split_percent,
                recipients: treasury_recipients,
                distributor: distributor.clone(),
            });
        }
        jobs.push(Arc::new(convert));
        info!("✅ Convert job registered");
    } else {
        warn!("⚠️  TOKEN_MINT_ADDRESS not set - holder refresh, withdraw and convert jobs disabled");
    }

    jobs.push(Arc::new(DistributeJob::new(
        accumulator.clone(),
        shares,
        distributor,
    )));
    info!("✅ Distribute job registered");

    let scheduler = Arc::new(Scheduler::new(jobs, config.intervals(), RetryPolicy::default()));

    Ok(AppContext {
        pool,
        accumulator,
        scheduler,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 10 max connections");

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
