use agent_economy_common::central_bank_client::CentralBankClient;
use agent_economy_common::identity_client::IdentityClient;
use agent_economy_common::platform_signer::PlatformSigner;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `write_lock` serializes the read-evaluate-transition sequence in
/// [`crate::deadlines::evaluate`] and the multi-step mutations in
/// [`crate::handlers`] (e.g. `create_task`'s lock-then-insert) at the
/// application level, the same way central-bank's `AppState` does for its
/// own precheck-then-act sequences.
#[derive(Clone)]
pub struct AppState {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
    pub write_lock: Arc<Mutex<()>>,
    pub identity: Arc<IdentityClient>,
    pub central_bank: Arc<CentralBankClient>,
    pub platform_signer: Arc<PlatformSigner>,
    pub platform_agent_id: String,
    pub storage_root: String,
    pub max_asset_size_bytes: usize,
    pub max_assets_per_task: i64,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        writer: SqlitePool,
        reader: SqlitePool,
        identity: IdentityClient,
        central_bank: CentralBankClient,
        platform_signer: PlatformSigner,
        platform_agent_id: String,
        storage_root: String,
        max_asset_size_bytes: usize,
        max_assets_per_task: i64,
    ) -> Self {
        Self {
            writer,
            reader,
            write_lock: Arc::new(Mutex::new(())),
            identity: Arc::new(identity),
            central_bank: Arc::new(central_bank),
            platform_signer: Arc::new(platform_signer),
            platform_agent_id,
            storage_root,
            max_asset_size_bytes,
            max_assets_per_task,
        }
    }
}
