//! SQLite pool setup shared by all four services: WAL journaling, a
//! `busy_timeout`, foreign keys on, per spec section 6.3. Each service keeps
//! a single-connection writer pool (the mutating path is already serialized
//! by an in-process `tokio::sync::Mutex`, so a single writer connection is
//! enough) and a small multi-connection pool for concurrent reads.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

pub struct Pools {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
}

pub async fn open(database_path: &str) -> Result<Pools, String> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create database directory {}: {e}", parent.display()))?;
        }
    }

    let connect_opts = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))
        .map_err(|e| format!("invalid database path {database_path}: {e}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_opts.clone())
        .await
        .map_err(|e| format!("database at {database_path} is unwritable: {e}"))?;

    let reader = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(connect_opts)
        .await
        .map_err(|e| format!("database at {database_path} is unreadable: {e}"))?;

    Ok(Pools { writer, reader })
}
