use crate::config::JudgeConfig;
use crate::task_board_client::TaskBoardClient;
use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use agent_economy_common::reputation_client::ReputationClient;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `write_lock` serializes `file_dispute`'s existence-check-then-insert and
/// `execute_ruling`'s full judge/escrow/feedback/record orchestration, the
/// same role it plays in central-bank's and task-board's `AppState`.
#[derive(Clone)]
pub struct AppState {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
    pub write_lock: Arc<Mutex<()>>,
    pub identity: Arc<IdentityClient>,
    pub central_bank: Arc<CentralBankClient>,
    pub task_board: Arc<TaskBoardClient>,
    pub reputation: Arc<ReputationClient>,
    pub platform_signer: Arc<PlatformSigner>,
    pub platform_agent_id: String,
    pub rebuttal_deadline_seconds: i64,
    pub judges: Arc<Vec<JudgeConfig>>,
    pub judge_http: reqwest::Client,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        writer: SqlitePool,
        reader: SqlitePool,
        identity: IdentityClient,
        central_bank: CentralBankClient,
        task_board: TaskBoardClient,
        reputation: ReputationClient,
        platform_signer: PlatformSigner,
        platform_agent_id: String,
        rebuttal_deadline_seconds: i64,
        judges: Vec<JudgeConfig>,
        judge_http: reqwest::Client,
    ) -> Self {
        Self {
            writer,
            reader,
            write_lock: Arc::new(Mutex::new(())),
            identity: Arc::new(identity),
            central_bank: Arc::new(central_bank),
            task_board: Arc::new(task_board),
            reputation: Arc::new(reputation),
            platform_signer: Arc::new(platform_signer),
            platform_agent_id,
            rebuttal_deadline_seconds,
            judges: Arc::new(judges),
            judge_http,
        }
    }
}
