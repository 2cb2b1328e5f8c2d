use anyhow::Context;
use clap::Parser;
use pdv_payment_gateway::app::config::Config;
use pdv_payment_gateway::handlers;
use pdv_payment_gateway::services::{CredentialStore, JsonFileStore, PaymentGateway, TracingNotifier};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdv-payment-gateway", about = "Payment dispatch service for the POS checkout")]
struct Cli {
    /// TOML config file; without it the environment is used
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    /// Where gateway credentials are persisted
    #[arg(long)]
    store_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env(),
    };
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(store_path) = cli.store_path {
        config.credential_store_path = store_path;
    }
    config.validate().context("invalid gateway configuration")?;

    info!("Starting PDV payment gateway on port {}", config.server_port);

    let store = Arc::new(JsonFileStore::new(&config.credential_store_path));
    let credentials = Arc::new(CredentialStore::load(store, config.credential_namespace.clone()));
    info!(
        "Loaded credentials from {} ({} gateway(s) configured)",
        config.credential_store_path.display(),
        credentials.configured().len()
    );

    let gateway = Arc::new(PaymentGateway::from_config(
        &config,
        credentials,
        Arc::new(TracingNotifier),
    )?);

    // Limpeza periódica das aprovações expiradas do ledger
    let sweeper = gateway.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            sweeper.purge_expired_approvals();
        }
    });

    let app = handlers::router(gateway);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
