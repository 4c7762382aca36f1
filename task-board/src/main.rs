use agent_economy_common::{config as common_config, logging};

#[tokio::main]
async fn main() {
    let cfg: task_board::config::Config = common_config::load(&common_config::config_path())
        .unwrap_or_else(|e| logging::fail_startup(e));

    logging::init_tracing(&cfg.log_level);

    if let Err(e) = task_board::run(cfg).await {
        tracing::error!(error = %e, "task board exited with error");
        std::process::exit(1);
    }
}
