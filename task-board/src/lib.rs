pub mod asset_manager;
pub mod config;
pub mod db;
pub mod deadlines;
pub mod escrow_coordinator;
pub mod handlers;
pub mod models;
pub mod payloads;
pub mod state;

use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::db as common_db;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/tasks", post(handlers::create_task).get(handlers::list_tasks))
        .route("/tasks/:task_id", get(handlers::get_task))
        .route("/tasks/:task_id/cancel", post(handlers::cancel_task))
        .route("/tasks/:task_id/bids", post(handlers::submit_bid).get(handlers::list_bids))
        .route("/tasks/:task_id/bids/:bid_id/accept", post(handlers::accept_bid))
        .route("/tasks/:task_id/assets", post(handlers::upload_asset).get(handlers::list_assets))
        .route("/tasks/:task_id/assets/:asset_id", get(handlers::download_asset))
        .route("/tasks/:task_id/submit", post(handlers::submit_deliverable))
        .route("/tasks/:task_id/approve", post(handlers::approve_task))
        .route("/tasks/:task_id/dispute", post(handlers::dispute_task))
        .route("/tasks/:task_id/ruling", post(handlers::record_ruling))
        .route("/health", get(handlers::health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let pools = common_db::open(&cfg.database_path).await.map_err(anyhow::Error::msg)?;
    db::migrate(&pools.writer).await?;
    std::fs::create_dir_all(&cfg.storage_root)?;

    let timeout = Duration::from_millis(cfg.downstream_timeout_ms);
    let identity = IdentityClient::new(cfg.identity_url.clone(), timeout);
    let central_bank = CentralBankClient::new(cfg.central_bank_url.clone(), timeout);
    let platform_signer = PlatformSigner::load(&cfg.platform_signing_key_path, cfg.platform_agent_id.clone())
        .map_err(anyhow::Error::msg)?;

    let state = AppState::new(
        pools.writer,
        pools.reader,
        identity,
        central_bank,
        platform_signer,
        cfg.platform_agent_id.clone(),
        cfg.storage_root.clone(),
        cfg.max_asset_size_bytes,
        cfg.max_assets_per_task,
    );
    let app = build_router(state, cfg.max_body_bytes);

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "task board listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
