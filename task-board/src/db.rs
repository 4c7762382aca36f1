//! Task/bid/asset persistence, grounded in `task_store.py`'s schema and
//! transaction discipline: `BEGIN IMMEDIATE` around multi-statement writes,
//! commit on success, rollback and translate on a unique-constraint violation.

use crate::models::{Asset, Bid, Task, TaskStatus};
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::Sqlite;
use sqlx::{Row, SqlitePool};

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id TEXT PRIMARY KEY,
            poster_id TEXT NOT NULL,
            title TEXT NOT NULL,
            spec TEXT NOT NULL,
            reward INTEGER NOT NULL,
            bidding_deadline_seconds INTEGER NOT NULL,
            deadline_seconds INTEGER NOT NULL,
            review_deadline_seconds INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            escrow_id TEXT NOT NULL,
            bid_count INTEGER NOT NULL DEFAULT 0,
            worker_id TEXT,
            accepted_bid_id TEXT,
            created_at TEXT NOT NULL,
            accepted_at TEXT,
            submitted_at TEXT,
            approved_at TEXT,
            cancelled_at TEXT,
            disputed_at TEXT,
            dispute_reason TEXT,
            ruling_id TEXT,
            ruled_at TEXT,
            worker_pct INTEGER,
            ruling_summary TEXT,
            expired_at TEXT,
            escrow_pending INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bids (
            bid_id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(task_id),
            bidder_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            submitted_at TEXT NOT NULL,
            UNIQUE(task_id, bidder_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            asset_id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(task_id),
            uploader_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            uploaded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn begin_immediate(pool: &SqlitePool) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(conn)
}

async fn commit(mut conn: PoolConnection<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query("COMMIT").execute(&mut *conn).await?;
    Ok(())
}

async fn rollback(mut conn: PoolConnection<Sqlite>) {
    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn opt_ts(value: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    value.map(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .expect("timestamps are always written as rfc3339")
            .with_timezone(&chrono::Utc)
    })
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Task {
    Task {
        task_id: row.get("task_id"),
        poster_id: row.get("poster_id"),
        title: row.get("title"),
        spec: row.get("spec"),
        reward: row.get("reward"),
        bidding_deadline_seconds: row.get("bidding_deadline_seconds"),
        deadline_seconds: row.get("deadline_seconds"),
        review_deadline_seconds: row.get("review_deadline_seconds"),
        status: TaskStatus::parse(row.get::<String, _>("status").as_str()),
        escrow_id: row.get("escrow_id"),
        bid_count: row.get("bid_count"),
        worker_id: row.get("worker_id"),
        accepted_bid_id: row.get("accepted_bid_id"),
        created_at: opt_ts(row.get("created_at")).expect("created_at is always set"),
        accepted_at: opt_ts(row.get("accepted_at")),
        submitted_at: opt_ts(row.get("submitted_at")),
        approved_at: opt_ts(row.get("approved_at")),
        cancelled_at: opt_ts(row.get("cancelled_at")),
        disputed_at: opt_ts(row.get("disputed_at")),
        dispute_reason: row.get("dispute_reason"),
        ruling_id: row.get("ruling_id"),
        ruled_at: opt_ts(row.get("ruled_at")),
        worker_pct: row.get("worker_pct"),
        ruling_summary: row.get("ruling_summary"),
        expired_at: opt_ts(row.get("expired_at")),
        escrow_pending: row.get::<i64, _>("escrow_pending") != 0,
    }
}

fn row_to_bid(row: &sqlx::sqlite::SqliteRow) -> Bid {
    Bid {
        bid_id: row.get("bid_id"),
        task_id: row.get("task_id"),
        bidder_id: row.get("bidder_id"),
        amount: row.get("amount"),
        submitted_at: opt_ts(row.get("submitted_at")).expect("submitted_at is always set"),
    }
}

fn row_to_asset(row: &sqlx::sqlite::SqliteRow) -> Asset {
    Asset {
        asset_id: row.get("asset_id"),
        task_id: row.get("task_id"),
        uploader_id: row.get("uploader_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        content_hash: row.get("content_hash"),
        uploaded_at: opt_ts(row.get("uploaded_at")).expect("uploaded_at is always set"),
    }
}

pub struct NewTask<'a> {
    pub task_id: &'a str,
    pub poster_id: &'a str,
    pub title: &'a str,
    pub spec: &'a str,
    pub reward: i64,
    pub bidding_deadline_seconds: i64,
    pub deadline_seconds: i64,
    pub review_deadline_seconds: i64,
    pub escrow_id: &'a str,
}

pub async fn insert_task(pool: &SqlitePool, new_task: NewTask<'_>) -> ServiceResult<Task> {
    let mut conn = begin_immediate(pool).await?;
    match insert_task_inner(&mut conn, &new_task).await {
        Ok(task) => {
            commit(conn).await?;
            Ok(task)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn insert_task_inner(conn: &mut PoolConnection<Sqlite>, new_task: &NewTask<'_>) -> ServiceResult<Task> {
    let created_at = chrono::Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (
            task_id, poster_id, title, spec, reward, bidding_deadline_seconds,
            deadline_seconds, review_deadline_seconds, status, escrow_id,
            bid_count, created_at, escrow_pending
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, 0, ?, 0)
        "#,
    )
    .bind(new_task.task_id)
    .bind(new_task.poster_id)
    .bind(new_task.title)
    .bind(new_task.spec)
    .bind(new_task.reward)
    .bind(new_task.bidding_deadline_seconds)
    .bind(new_task.deadline_seconds)
    .bind(new_task.review_deadline_seconds)
    .bind(new_task.escrow_id)
    .bind(created_at.to_rfc3339())
    .execute(&mut **conn)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ServiceError::new(
                ErrorCode::TaskAlreadyExists,
                format!("a task with task_id '{}' already exists", new_task.task_id),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    get_task_via(&mut **conn, new_task.task_id)
        .await?
        .ok_or_else(|| ServiceError::internal("task vanished immediately after insert"))
}

pub async fn get_task(pool: &SqlitePool, task_id: &str) -> ServiceResult<Option<Task>> {
    get_task_via(pool, task_id).await
}

async fn get_task_via<'e, E>(executor: E, task_id: &str) -> ServiceResult<Option<Task>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.as_ref().map(row_to_task))
}

pub struct TaskFilter {
    pub status: Option<String>,
    pub poster_id: Option<String>,
    pub worker_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_tasks(pool: &SqlitePool, filter: TaskFilter) -> ServiceResult<Vec<Task>> {
    let mut query = "SELECT * FROM tasks".to_string();
    let mut clauses = Vec::new();
    if filter.status.is_some() {
        clauses.push("status = ?");
    }
    if filter.poster_id.is_some() {
        clauses.push("poster_id = ?");
    }
    if filter.worker_id.is_some() {
        clauses.push("worker_id = ?");
    }
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }
    query.push_str(" ORDER BY created_at DESC");
    if filter.limit.is_some() {
        query.push_str(" LIMIT ?");
    }
    if filter.offset.is_some() {
        query.push_str(" OFFSET ?");
    }

    let mut q = sqlx::query(&query);
    if let Some(status) = &filter.status {
        q = q.bind(status);
    }
    if let Some(poster_id) = &filter.poster_id {
        q = q.bind(poster_id);
    }
    if let Some(worker_id) = &filter.worker_id {
        q = q.bind(worker_id);
    }
    if let Some(limit) = filter.limit {
        q = q.bind(limit);
    }
    if let Some(offset) = filter.offset {
        q = q.bind(offset);
    }

    let rows = q.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_task).collect())
}

pub async fn count_tasks(pool: &SqlitePool) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM tasks").fetch_one(pool).await?;
    Ok(row.get::<i64, _>("n"))
}

pub async fn count_tasks_by_status(pool: &SqlitePool) -> ServiceResult<Vec<(String, i64)>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n"))).collect())
}

pub async fn mark_cancelled(pool: &SqlitePool, task_id: &str) -> ServiceResult<()> {
    sqlx::query("UPDATE tasks SET status = 'cancelled', cancelled_at = ? WHERE task_id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_accepted(
    pool: &SqlitePool,
    task_id: &str,
    worker_id: &str,
    accepted_bid_id: &str,
) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE tasks SET status = 'accepted', worker_id = ?, accepted_bid_id = ?, accepted_at = ? WHERE task_id = ?",
    )
    .bind(worker_id)
    .bind(accepted_bid_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_submitted(pool: &SqlitePool, task_id: &str) -> ServiceResult<()> {
    sqlx::query("UPDATE tasks SET status = 'submitted', submitted_at = ? WHERE task_id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_approved(pool: &SqlitePool, task_id: &str) -> ServiceResult<()> {
    sqlx::query("UPDATE tasks SET status = 'approved', approved_at = ? WHERE task_id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_disputed(pool: &SqlitePool, task_id: &str, reason: &str) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE tasks SET status = 'disputed', disputed_at = ?, dispute_reason = ? WHERE task_id = ?",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(reason)
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_ruled(
    pool: &SqlitePool,
    task_id: &str,
    ruling_id: &str,
    worker_pct: i64,
    ruling_summary: &str,
) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE tasks SET status = 'ruled', ruled_at = ?, ruling_id = ?, worker_pct = ?, ruling_summary = ? WHERE task_id = ?",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(ruling_id)
    .bind(worker_pct)
    .bind(ruling_summary)
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_expired(pool: &SqlitePool, task_id: &str) -> ServiceResult<()> {
    sqlx::query("UPDATE tasks SET status = 'expired', expired_at = ? WHERE task_id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_bid(
    pool: &SqlitePool,
    bid_id: &str,
    task_id: &str,
    bidder_id: &str,
    amount: i64,
) -> ServiceResult<Bid> {
    let mut conn = begin_immediate(pool).await?;
    match insert_bid_inner(&mut conn, bid_id, task_id, bidder_id, amount).await {
        Ok(bid) => {
            commit(conn).await?;
            Ok(bid)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn insert_bid_inner(
    conn: &mut PoolConnection<Sqlite>,
    bid_id: &str,
    task_id: &str,
    bidder_id: &str,
    amount: i64,
) -> ServiceResult<Bid> {
    let submitted_at = chrono::Utc::now();
    let result = sqlx::query(
        "INSERT INTO bids (bid_id, task_id, bidder_id, amount, submitted_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(bid_id)
    .bind(task_id)
    .bind(bidder_id)
    .bind(amount)
    .bind(submitted_at.to_rfc3339())
    .execute(&mut **conn)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ServiceError::new(
                ErrorCode::BidAlreadyExists,
                "this agent already bid on this task",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    sqlx::query("UPDATE tasks SET bid_count = bid_count + 1 WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut **conn)
        .await?;

    Ok(Bid {
        bid_id: bid_id.to_string(),
        task_id: task_id.to_string(),
        bidder_id: bidder_id.to_string(),
        amount,
        submitted_at,
    })
}

pub async fn get_bid(pool: &SqlitePool, bid_id: &str, task_id: &str) -> ServiceResult<Option<Bid>> {
    let row = sqlx::query("SELECT * FROM bids WHERE bid_id = ? AND task_id = ?")
        .bind(bid_id)
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_bid))
}

pub async fn get_bids_for_task(pool: &SqlitePool, task_id: &str) -> ServiceResult<Vec<Bid>> {
    let rows = sqlx::query("SELECT * FROM bids WHERE task_id = ? ORDER BY submitted_at")
        .bind(task_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_bid).collect())
}

pub async fn insert_asset(
    pool: &SqlitePool,
    asset_id: &str,
    task_id: &str,
    uploader_id: &str,
    filename: &str,
    content_type: &str,
    size_bytes: i64,
    content_hash: &str,
) -> ServiceResult<Asset> {
    let uploaded_at = chrono::Utc::now();
    sqlx::query(
        r#"
        INSERT INTO assets (
            asset_id, task_id, uploader_id, filename, content_type,
            size_bytes, content_hash, uploaded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset_id)
    .bind(task_id)
    .bind(uploader_id)
    .bind(filename)
    .bind(content_type)
    .bind(size_bytes)
    .bind(content_hash)
    .bind(uploaded_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(Asset {
        asset_id: asset_id.to_string(),
        task_id: task_id.to_string(),
        uploader_id: uploader_id.to_string(),
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        size_bytes,
        content_hash: content_hash.to_string(),
        uploaded_at,
    })
}

pub async fn get_asset(pool: &SqlitePool, task_id: &str, asset_id: &str) -> ServiceResult<Option<Asset>> {
    let row = sqlx::query("SELECT * FROM assets WHERE task_id = ? AND asset_id = ?")
        .bind(task_id)
        .bind(asset_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_asset))
}

pub async fn get_assets_for_task(pool: &SqlitePool, task_id: &str) -> ServiceResult<Vec<Asset>> {
    let rows = sqlx::query("SELECT * FROM assets WHERE task_id = ? ORDER BY uploaded_at")
        .bind(task_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_asset).collect())
}

pub async fn count_assets(pool: &SqlitePool, task_id: &str) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM assets WHERE task_id = ?")
        .bind(task_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}
