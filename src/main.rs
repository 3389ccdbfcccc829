use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use points_ledger_service::{
    adapters::{database::memory::MemoryLedger, http},
    commands::DomainLogic,
    config::Config,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = Config::parse();
    init_tracing(&config);

    let domain = DomainLogic::new(Arc::new(MemoryLedger::default()));
    let app = http::router(domain);

    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, "points ledger listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_filter()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
