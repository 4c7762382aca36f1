use agent_economy_common::identity_client::IdentityClient;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `writer` and `reader` point at the same SQLite file; `writer` is capped
/// at one connection so `BEGIN IMMEDIATE` transactions serialize naturally,
/// `write_lock` additionally serializes at the application level so a
/// precheck-then-act sequence (e.g. `credit`'s reference lookup) can't
/// interleave with another request's write.
#[derive(Clone)]
pub struct AppState {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
    pub write_lock: Arc<Mutex<()>>,
    pub identity: Arc<IdentityClient>,
    pub platform_agent_id: String,
}

impl AppState {
    pub fn new(
        writer: SqlitePool,
        reader: SqlitePool,
        identity: IdentityClient,
        platform_agent_id: String,
    ) -> Self {
        Self {
            writer,
            reader,
            write_lock: Arc::new(Mutex::new(())),
            identity: Arc::new(identity),
            platform_agent_id,
        }
    }
}
