//! Analytics Server - event ingestion, dashboard metrics, registrations
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin analytics_server
//! ```
//!
//! ## Environment Variables
//!
//! See `AppConfig::from_env` for the full list. Most used:
//!
//! - ANALYTICS_DB_PATH - SQLite database path (default: data/analytics.db)
//! - ANALYTICS_BIND_ADDR - Listen address (default: 127.0.0.1:3000)
//! - DASHBOARD_TOKEN - Bearer token required by /api/metrics (default: unset, open)
//! - RUST_LOG - Logging level (optional, default: info)

use sitepulse::api::{router, AppState};
use sitepulse::auth::verifier_for;
use sitepulse::config::AppConfig;
use sitepulse::event_store::{EventStore, SqliteStore};
use sitepulse::metrics::MetricsAggregator;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = AppConfig::from_env()?;

    log::info!("🚀 Starting Analytics Server");
    log::info!("   Database: {}", config.store.db_path);
    log::info!(
        "   Pool: {} connections, acquire timeout {}ms, query timeout {}ms",
        config.store.pool_size,
        config.store.acquire_timeout.as_millis(),
        config.store.query_timeout.as_millis()
    );
    log::info!(
        "   Funnel baseline: {} (start step: {}, form start: {})",
        config.report.funnel_baseline.as_str(),
        config.report.funnel_start_step,
        config.report.form_start_step
    );
    log::info!(
        "   Page view series: per {}, limit {}",
        config.report.series_bucket.as_str(),
        config
            .report
            .series_limit
            .map_or_else(|| "none".to_string(), |n| n.to_string())
    );

    let store = Arc::new(SqliteStore::open(config.store.clone()).await?);
    let verifier = verifier_for(config.dashboard_token.as_deref());

    log::info!("📊 Backend: {}", store.backend_type());
    log::info!("🔒 Dashboard access: {}", verifier.name());

    let state = Arc::new(AppState {
        events: store.clone(),
        registrations: store,
        aggregator: MetricsAggregator::new(config.report.clone()),
        verifier,
    });

    let listener = TcpListener::bind(config.bind_addr).await?;
    log::info!("✅ Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("👋 Analytics Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("🛑 Shutdown signal received"),
        Err(e) => {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
