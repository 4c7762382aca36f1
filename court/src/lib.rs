pub mod config;
pub mod db;
pub mod handlers;
pub mod judges;
pub mod models;
pub mod payloads;
pub mod state;
pub mod task_board_client;

use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::db as common_db;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use agent_economy_common::reputation_client::ReputationClient;
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::time::Duration;
use task_board_client::TaskBoardClient;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/disputes/file", post(handlers::file_dispute))
        .route("/disputes/:dispute_id/rebuttal", post(handlers::submit_rebuttal))
        .route("/disputes/:dispute_id/rule", post(handlers::execute_ruling))
        .route("/disputes/:dispute_id", get(handlers::get_dispute))
        .route("/disputes", get(handlers::list_disputes))
        .route("/health", get(handlers::health))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let pools = common_db::open(&cfg.database_path).await.map_err(anyhow::Error::msg)?;
    db::migrate(&pools.writer).await?;

    let timeout = Duration::from_millis(cfg.downstream_timeout_ms);
    let identity = IdentityClient::new(cfg.identity_url.clone(), timeout);
    let central_bank = CentralBankClient::new(cfg.central_bank_url.clone(), timeout);
    let task_board = TaskBoardClient::new(cfg.task_board_url.clone(), timeout);
    let reputation = ReputationClient::new(cfg.reputation_url.clone(), timeout);
    let platform_signer = PlatformSigner::load(&cfg.platform_signing_key_path, cfg.platform_agent_id.clone())
        .map_err(anyhow::Error::msg)?;
    let judge_http = judges::build_judge_http_client(timeout);

    let state = AppState::new(
        pools.writer,
        pools.reader,
        identity,
        central_bank,
        task_board,
        reputation,
        platform_signer,
        cfg.platform_agent_id.clone(),
        cfg.rebuttal_deadline_seconds,
        cfg.judges.clone(),
        judge_http,
    );
    let app = build_router(state, cfg.max_body_bytes);

    let addr = format!("{}:{}", cfg.bind_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "court listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
