mod config;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use jobboard_api::AppStateInner;
use jobboard_gateway::{GatewayState, GroupRegistry, SessionGate};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(jobboard_db::Database::open(&config.db_path)?);

    // One registry shared by the gateway (membership) and the notifier (emit)
    let registry = GroupRegistry::new();
    let app_state = AppStateInner::new(
        db,
        registry.clone(),
        config.jwt_secret.clone(),
        config.token_ttl,
    );
    let gateway_state = GatewayState::new(SessionGate::new(&config.jwt_secret), registry);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(jobboard_api::router(app_state))
        .merge(jobboard_gateway::router(gateway_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Job board server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
