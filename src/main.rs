use std::sync::Arc;

use woz_server::ServerConfig;
use woz_store::SessionStore;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting wizard-of-oz relay server");

    let mut config = ServerConfig::default();
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
        config.port = port;
    }
    if let Ok(origin) = std::env::var("FRONTEND_ORIGIN") {
        config.cors_origin = Some(origin);
    }

    // Session state lives only for the life of this process.
    let store = Arc::new(SessionStore::new());

    let handle = woz_server::start(config, store)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Relay ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
