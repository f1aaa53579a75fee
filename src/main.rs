//! Billing Sync - Main Application Entry Point
//!
//! Receives payment processor webhooks and mirrors billing state into
//! PostgreSQL. See the library crate for the architecture.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the processor client and webhook registry
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

use std::sync::Arc;

use billing_sync::{
    AppState, build_router,
    config::Config,
    db,
    store::PgStore,
    stripe::StripeClient,
    webhooks::{LogReceiver, WebhookRegistry},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default "info" filter
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let stripe = StripeClient::from_config(&config)?;

    let registry = WebhookRegistry::with_default_handlers()?;
    registry.connect_all(Arc::new(LogReceiver));
    tracing::info!(kinds = registry.kinds().len(), "Webhook handlers registered");

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(stripe),
        Arc::new(registry),
    );
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
