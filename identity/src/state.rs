use agent_economy_common::db::Pools;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide application state, constructed once at startup and passed
/// into every handler via `axum::extract::State` - never thread-local.
#[derive(Clone)]
pub struct AppState {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
    /// Serializes all mutations, per spec section 5.
    pub write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pools: Pools) -> Self {
        Self {
            writer: pools.writer,
            reader: pools.reader,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}
