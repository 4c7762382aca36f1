//! Dispute persistence, grounded in `dispute_store.py`'s schema and
//! transaction discipline: every mutation runs inside its own
//! `BEGIN IMMEDIATE` transaction, and `disputes(task_id)` plus
//! `votes(dispute_id, judge_id)` are partial/unique indices that double as
//! idempotency guards rather than being enforced purely in application code.
//!
//! Every statement inside a transaction runs against the connection
//! `begin_immediate` already checked out of the (single-connection) writer
//! pool, never against the pool itself - re-acquiring a second connection
//! from a pool of one while the first is still held would deadlock.

use crate::models::{Dispute, DisputeStatus, Vote};
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::ids::new_vote_id;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::Sqlite;
use sqlx::{Row, SqlitePool};

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS disputes (
            dispute_id        TEXT PRIMARY KEY,
            task_id           TEXT NOT NULL,
            claimant_id       TEXT NOT NULL,
            respondent_id     TEXT NOT NULL,
            claim             TEXT NOT NULL,
            rebuttal          TEXT,
            status            TEXT NOT NULL DEFAULT 'rebuttal_pending',
            escrow_id         TEXT NOT NULL,
            rebuttal_deadline TEXT NOT NULL,
            worker_pct        INTEGER,
            ruling_summary    TEXT,
            filed_at          TEXT NOT NULL,
            rebutted_at       TEXT,
            ruled_at          TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            vote_id     TEXT PRIMARY KEY,
            dispute_id  TEXT NOT NULL REFERENCES disputes(dispute_id),
            judge_id    TEXT NOT NULL,
            worker_pct  INTEGER NOT NULL,
            reasoning   TEXT NOT NULL,
            voted_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS ux_disputes_task ON disputes(task_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS ux_votes_dispute_judge ON votes(dispute_id, judge_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS ix_disputes_status ON disputes(status, filed_at)")
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
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn parse_ts(value: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .expect("timestamps are always written as rfc3339")
        .with_timezone(&chrono::Utc)
}

fn row_to_dispute(row: &sqlx::sqlite::SqliteRow) -> Dispute {
    let rebutted_at: Option<String> = row.get("rebutted_at");
    let ruled_at: Option<String> = row.get("ruled_at");
    Dispute {
        dispute_id: row.get("dispute_id"),
        task_id: row.get("task_id"),
        claimant_id: row.get("claimant_id"),
        respondent_id: row.get("respondent_id"),
        claim: row.get("claim"),
        rebuttal: row.get("rebuttal"),
        status: DisputeStatus::parse(row.get::<String, _>("status").as_str()),
        escrow_id: row.get("escrow_id"),
        rebuttal_deadline: parse_ts(row.get("rebuttal_deadline")),
        worker_pct: row.get("worker_pct"),
        ruling_summary: row.get("ruling_summary"),
        filed_at: parse_ts(row.get("filed_at")),
        rebutted_at: rebutted_at.map(parse_ts),
        ruled_at: ruled_at.map(parse_ts),
    }
}

fn row_to_vote(row: &sqlx::sqlite::SqliteRow) -> Vote {
    Vote {
        vote_id: row.get("vote_id"),
        dispute_id: row.get("dispute_id"),
        judge_id: row.get("judge_id"),
        worker_pct: row.get("worker_pct"),
        reasoning: row.get("reasoning"),
        voted_at: parse_ts(row.get("voted_at")),
    }
}

pub async fn get_dispute(pool: &SqlitePool, dispute_id: &str) -> ServiceResult<Option<Dispute>> {
    let row = sqlx::query("SELECT * FROM disputes WHERE dispute_id = ?")
        .bind(dispute_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_dispute))
}

pub async fn get_dispute_by_task(pool: &SqlitePool, task_id: &str) -> ServiceResult<Option<Dispute>> {
    let row = sqlx::query("SELECT * FROM disputes WHERE task_id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_dispute))
}

pub async fn get_votes(pool: &SqlitePool, dispute_id: &str) -> ServiceResult<Vec<Vote>> {
    let rows = sqlx::query("SELECT * FROM votes WHERE dispute_id = ? ORDER BY judge_id")
        .bind(dispute_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_vote).collect())
}

pub async fn count_disputes(pool: &SqlitePool) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM disputes").fetch_one(pool).await?;
    Ok(row.get::<i64, _>("n"))
}

pub async fn count_active(pool: &SqlitePool) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM disputes WHERE status != 'ruled'")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}

pub struct ListFilter<'a> {
    pub task_id: Option<&'a str>,
    pub status: Option<&'a str>,
}

pub async fn list_disputes(pool: &SqlitePool, filter: ListFilter<'_>) -> ServiceResult<Vec<Dispute>> {
    let mut sql = String::from("SELECT * FROM disputes WHERE 1 = 1");
    if filter.task_id.is_some() {
        sql.push_str(" AND task_id = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY filed_at DESC, dispute_id");

    let mut query = sqlx::query(&sql);
    if let Some(task_id) = filter.task_id {
        query = query.bind(task_id);
    }
    if let Some(status) = filter.status {
        query = query.bind(status);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_dispute).collect())
}

/// Inserts a new dispute, relying on `ux_disputes_task` to turn a second
/// `file_dispute` for the same task into a caught unique violation rather
/// than a second row.
pub async fn insert_dispute(pool: &SqlitePool, dispute: Dispute) -> ServiceResult<Dispute> {
    let mut conn = begin_immediate(pool).await?;
    match insert_dispute_inner(&mut conn, &dispute).await {
        Ok(()) => {
            commit(conn).await?;
            Ok(dispute)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn insert_dispute_inner(conn: &mut PoolConnection<Sqlite>, dispute: &Dispute) -> ServiceResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO disputes
            (dispute_id, task_id, claimant_id, respondent_id, claim, status,
             escrow_id, rebuttal_deadline, filed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&dispute.dispute_id)
    .bind(&dispute.task_id)
    .bind(&dispute.claimant_id)
    .bind(&dispute.respondent_id)
    .bind(&dispute.claim)
    .bind(dispute.status.as_str())
    .bind(&dispute.escrow_id)
    .bind(dispute.rebuttal_deadline.to_rfc3339())
    .bind(dispute.filed_at.to_rfc3339())
    .execute(&mut **conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(ServiceError::new(
            ErrorCode::DisputeAlreadyExists,
            "a dispute has already been filed for this task",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Records the respondent's rebuttal. One-shot: a second call finds the
/// dispute already out of `rebuttal_pending` and the caller surfaces
/// `RebuttalAlreadySubmitted` (or `InvalidDisputeStatus`) without a write.
pub async fn update_rebuttal(
    pool: &SqlitePool,
    dispute_id: &str,
    rebuttal: &str,
    rebutted_at: chrono::DateTime<chrono::Utc>,
) -> ServiceResult<()> {
    let mut conn = begin_immediate(pool).await?;
    let result = sqlx::query(
        "UPDATE disputes SET rebuttal = ?, rebutted_at = ? WHERE dispute_id = ? AND status = 'rebuttal_pending'",
    )
    .bind(rebuttal)
    .bind(rebutted_at.to_rfc3339())
    .bind(dispute_id)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(r) if r.rows_affected() == 1 => {
            commit(conn).await?;
            Ok(())
        }
        Ok(_) => {
            rollback(conn).await;
            Err(ServiceError::new(
                ErrorCode::RebuttalAlreadySubmitted,
                "a rebuttal has already been recorded for this dispute",
            ))
        }
        Err(e) => {
            rollback(conn).await;
            Err(e.into())
        }
    }
}

pub async fn set_status(pool: &SqlitePool, dispute_id: &str, status: DisputeStatus) -> ServiceResult<()> {
    let mut conn = begin_immediate(pool).await?;
    match sqlx::query("UPDATE disputes SET status = ? WHERE dispute_id = ?")
        .bind(status.as_str())
        .bind(dispute_id)
        .execute(&mut *conn)
        .await
    {
        Ok(_) => {
            commit(conn).await?;
            Ok(())
        }
        Err(e) => {
            rollback(conn).await;
            Err(e.into())
        }
    }
}

/// Reverts a dispute from `judging` back to `rebuttal_pending` and deletes
/// any votes cast this attempt, run as a single transaction so a crash
/// mid-revert never leaves orphaned votes against a non-`judging` dispute.
pub async fn revert_to_rebuttal_pending(pool: &SqlitePool, dispute_id: &str) -> ServiceResult<()> {
    let mut conn = begin_immediate(pool).await?;
    match revert_inner(&mut conn, dispute_id).await {
        Ok(()) => {
            commit(conn).await?;
            Ok(())
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn revert_inner(conn: &mut PoolConnection<Sqlite>, dispute_id: &str) -> ServiceResult<()> {
    sqlx::query("DELETE FROM votes WHERE dispute_id = ?")
        .bind(dispute_id)
        .execute(&mut **conn)
        .await?;
    sqlx::query("UPDATE disputes SET status = 'rebuttal_pending' WHERE dispute_id = ?")
        .bind(dispute_id)
        .execute(&mut **conn)
        .await?;
    Ok(())
}

/// Persists the final ruling and every vote atomically: this only runs once
/// the three external effects (escrow split, feedback, task board record)
/// have all already succeeded.
pub async fn persist_ruling(
    pool: &SqlitePool,
    dispute_id: &str,
    worker_pct: i64,
    ruling_summary: &str,
    ruled_at: chrono::DateTime<chrono::Utc>,
    votes: &[Vote],
) -> ServiceResult<()> {
    let mut conn = begin_immediate(pool).await?;
    match persist_ruling_inner(&mut conn, dispute_id, worker_pct, ruling_summary, ruled_at, votes).await {
        Ok(()) => {
            commit(conn).await?;
            Ok(())
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn persist_ruling_inner(
    conn: &mut PoolConnection<Sqlite>,
    dispute_id: &str,
    worker_pct: i64,
    ruling_summary: &str,
    ruled_at: chrono::DateTime<chrono::Utc>,
    votes: &[Vote],
) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE disputes SET status = 'ruled', worker_pct = ?, ruling_summary = ?, ruled_at = ? WHERE dispute_id = ?",
    )
    .bind(worker_pct)
    .bind(ruling_summary)
    .bind(ruled_at.to_rfc3339())
    .bind(dispute_id)
    .execute(&mut **conn)
    .await?;

    for vote in votes {
        sqlx::query(
            "INSERT INTO votes (vote_id, dispute_id, judge_id, worker_pct, reasoning, voted_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(vote.vote_id.clone())
        .bind(dispute_id)
        .bind(&vote.judge_id)
        .bind(vote.worker_pct)
        .bind(&vote.reasoning)
        .bind(vote.voted_at.to_rfc3339())
        .execute(&mut **conn)
        .await?;
    }

    Ok(())
}

pub fn new_vote(dispute_id: &str, judge_id: String, worker_pct: i64, reasoning: String, voted_at: chrono::DateTime<chrono::Utc>) -> Vote {
    Vote {
        vote_id: new_vote_id(),
        dispute_id: dispute_id.to_string(),
        judge_id,
        worker_pct,
        reasoning,
        voted_at,
    }
}
