use agent_economy_common::{config as common_config, logging};

#[tokio::main]
async fn main() {
    let cfg: central_bank::config::Config = common_config::load(&common_config::config_path())
        .unwrap_or_else(|e| logging::fail_startup(e));

    logging::init_tracing(&cfg.log_level);

    if let Err(e) = central_bank::run(cfg).await {
        tracing::error!(error = %e, "central bank exited with error");
        std::process::exit(1);
    }
}
