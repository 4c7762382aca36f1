pub mod config;
pub mod db;
pub mod handlers;
pub mod state;

use agent_economy_common::db as common_db;
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/agents", post(handlers::register_agent).get(handlers::list_agents))
        .route("/agents/:agent_id", get(handlers::get_agent))
        .route("/verify", post(handlers::verify_envelope))
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

    let state = AppState::new(pools);
    let app = build_router(state, cfg.max_body_bytes);

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "identity service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
