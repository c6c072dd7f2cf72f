mod accumulator;
mod adapters;
mod api;
mod bootstrap;
mod config;
mod error;
mod execution;
mod jobs;
mod payout;
mod recipients;
mod reload;
mod scheduler;
mod server;

use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{api::AppState, config::Config, reload::EnvReloader};

const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(5);

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,distributor=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("🛑 SIGINT received"),
        _ = terminate => info!("🛑 SIGTERM received"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("🚀 Starting revenue distributor");

    let config = Config::from_env().context("Invalid configuration")?;

    // Startup failures (database, wallet, RPC) are retried until they clear
    let context = loop {
        match bootstrap::initialize_app_context(&config).await {
            Ok(context) => break context,
            Err(e) => {
                error!(
                    "💥 Startup failed: {}. Restarting in {:?}",
                    e, BOOTSTRAP_RETRY_DELAY
                );
                tokio::time::sleep(BOOTSTRAP_RETRY_DELAY).await;
            }
        }
    };

    let scheduler = context.scheduler.clone();
    let startup = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };
    let reloader = EnvReloader::new(&config.env_file, scheduler.clone()).spawn();

    let app = server::create_app(AppState {
        scheduler: scheduler.clone(),
        accumulator: context.accumulator.clone(),
    });
    server::run_server(app, &config.bind_address, shutdown_signal())
        .await
        .context("Status server failed")?;

    info!("⏹️ Shutting down");
    startup.abort();
    reloader.abort();
    scheduler.shutdown();
    context.pool.close().await;
    info!("👋 Shutdown complete");

    Ok(())
}
