//! scanlink - Main Application Entry Point
//!
//! REST service that mints tracked short identifiers, renders QR images for
//! them, and accounts for every scan while redirecting to the destination.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the long-lived service objects (caches, limiters, record service)
//! 4. Start the background sweep/reap tasks
//! 5. Build the HTTP router and serve

use scanlink::config::Config;
use scanlink::routes::build_router;
use scanlink::state::AppState;
use scanlink::store::PgRecordStore;
use scanlink::{db, store::RecordStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Wire the long-lived service objects around the Postgres store
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool));
    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::build(config, store);
    state.spawn_maintenance();

    let app = build_router(state);

    // Bind to network address and start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
