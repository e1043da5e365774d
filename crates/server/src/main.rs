use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod extract;
mod server;
mod session;

use config::ServerConfig;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guestpass_server=info,guestpass=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Guestpass server");

    let config = ServerConfig::from_env()?;
    info!("Database: {}", config.store.database_url);
    info!("Listening on: {}", config.bind_addr());

    let state = Arc::new(AppState::new(config).await?);
    server::run(state.clone()).await?;

    state.ledger.store().close().await;
    Ok(())
}
