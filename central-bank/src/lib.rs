pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod payloads;
pub mod state;

use agent_economy_common::db as common_db;
use agent_economy_common::identity_client::IdentityClient;
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/:account_id", get(handlers::get_account))
        .route("/accounts/:account_id/transactions", get(handlers::list_transactions))
        .route("/credit", post(handlers::credit))
        .route("/escrow", post(handlers::escrow_lock))
        .route("/escrow/release", post(handlers::escrow_release))
        .route("/escrow/split", post(handlers::escrow_split))
        .route("/health", get(handlers::health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let pools = common_db::open(&cfg.database_path)
        .await
        .map_err(anyhow::Error::msg)?;
    db::migrate(&pools.writer).await?;

    let identity = IdentityClient::new(
        cfg.identity_url.clone(),
        Duration::from_millis(cfg.downstream_timeout_ms),
    );
    let state = AppState::new(pools.writer, pools.reader, identity, cfg.platform_agent_id.clone());
    let app = build_router(state, cfg.max_body_bytes);

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "central bank listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
