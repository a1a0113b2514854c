use alerthub_engine::{NotificationEngine, Scheduler};
use alerthub_notify::SenderRegistry;
use alerthub_server::config::ServerConfig;
use alerthub_server::state::AppState;
use alerthub_server::{app, retention, seed};
use alerthub_storage::AlertStore;
use anyhow::Result;
use chrono::FixedOffset;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("alerthub=info".parse()?))
        .init();

    alerthub_common::id::init(1, 1);

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = match ServerConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "config not loaded, using defaults");
            ServerConfig::default()
        }
    };

    tracing::info!(
        http_port = config.http_port,
        db = %config.database.url,
        "alerthub-server starting"
    );

    let store = Arc::new(AlertStore::new(&config.database.url).await?);
    seed::ensure_default_template(&store).await?;
    seed::ensure_default_settings(&store).await?;

    let tz = FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .ok_or_else(|| anyhow::anyhow!("invalid utc_offset_hours: {}", config.utc_offset_hours))?;
    let senders = Arc::new(SenderRegistry::default());
    let engine = NotificationEngine::new(store.clone(), senders, tz);

    let scheduler = Scheduler::new(store.clone(), engine.clone());
    scheduler.start().await;

    tokio::spawn(retention::run_retention_loop(store.clone()));

    let state = AppState {
        store: store.clone(),
        engine,
    };
    let http_app = app::build_http_app(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(http = %addr, "alerthub-server started");

    axum::serve(listener, http_app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;

    scheduler.stop().await;
    tracing::info!("server stopped");
    Ok(())
}
