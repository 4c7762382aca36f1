//! Ledger persistence. Every mutating function here runs its own
//! `BEGIN IMMEDIATE` / commit-or-rollback transaction and implements the
//! "constraint is the idempotency guard" two-layer pattern described in
//! SPEC_FULL.md section 4.2, grounded in `ledger.py`: an optimistic
//! pre-check avoids unnecessary write-lock contention in the common case,
//! but the actual guarantee is the partial unique index plus a caught
//! constraint violation on insert.
//!
//! The writer pool (`common/src/db.rs`) is capped at a single connection, so
//! every statement a `begin_immediate`'d transaction makes must run against
//! the connection it already checked out rather than re-acquiring from the
//! pool - a second acquire would block forever waiting on a permit only the
//! held connection can release.

use crate::models::{Account, Escrow, EscrowStatus, Transaction};
use agent_economy_common::error::{ErrorCode, ServiceError, ServiceResult};
use agent_economy_common::ids::{new_escrow_id, new_tx_id};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::Sqlite;
use sqlx::{Row, SqlitePool};

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            balance    INTEGER NOT NULL CHECK (balance >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            tx_id         TEXT PRIMARY KEY,
            account_id    TEXT NOT NULL REFERENCES accounts(account_id),
            kind          TEXT NOT NULL,
            amount        INTEGER NOT NULL CHECK (amount > 0),
            balance_after INTEGER NOT NULL,
            reference     TEXT,
            timestamp     TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escrow (
            escrow_id         TEXT PRIMARY KEY,
            payer_account_id  TEXT NOT NULL REFERENCES accounts(account_id),
            amount            INTEGER NOT NULL CHECK (amount > 0),
            task_id           TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'locked',
            created_at        TEXT NOT NULL,
            resolved_at       TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_credit_reference ON transactions(account_id, reference) WHERE kind = 'credit'",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_locked_escrow_task ON escrow(payer_account_id, task_id) WHERE status = 'locked'",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_tx_account_time ON transactions(account_id, timestamp, tx_id)",
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
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    Account {
        account_id: row.get("account_id"),
        balance: row.get("balance"),
        created_at: parse_ts(row.get("created_at")),
    }
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Transaction {
    Transaction {
        tx_id: row.get("tx_id"),
        account_id: row.get("account_id"),
        kind: row.get("kind"),
        amount: row.get("amount"),
        balance_after: row.get("balance_after"),
        reference: row.get("reference"),
        timestamp: parse_ts(row.get("timestamp")),
    }
}

fn row_to_escrow(row: &sqlx::sqlite::SqliteRow) -> Escrow {
    let resolved_at: Option<String> = row.get("resolved_at");
    Escrow {
        escrow_id: row.get("escrow_id"),
        payer_account_id: row.get("payer_account_id"),
        amount: row.get("amount"),
        task_id: row.get("task_id"),
        status: EscrowStatus::parse(row.get::<String, _>("status").as_str()),
        created_at: parse_ts(row.get("created_at")),
        resolved_at: resolved_at.map(|s| parse_ts(s)),
    }
}

fn parse_ts(value: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .expect("timestamps are always written as rfc3339")
        .with_timezone(&chrono::Utc)
}

/// Looks up an account through any executor - the shared read pool for a
/// plain `GET`, or a transaction's own connection when called from inside a
/// `*_inner` function.
pub async fn get_account<'e, E>(executor: E, account_id: &str) -> ServiceResult<Option<Account>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM accounts WHERE account_id = ?")
        .bind(account_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.as_ref().map(row_to_account))
}

pub async fn list_transactions(pool: &SqlitePool, account_id: &str) -> ServiceResult<Vec<Transaction>> {
    let rows = sqlx::query("SELECT * FROM transactions WHERE account_id = ? ORDER BY timestamp, tx_id")
        .bind(account_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_transaction).collect())
}

pub async fn count_accounts(pool: &SqlitePool) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM accounts").fetch_one(pool).await?;
    Ok(row.get::<i64, _>("n"))
}

pub async fn total_escrowed(pool: &SqlitePool) -> ServiceResult<i64> {
    let row = sqlx::query("SELECT COALESCE(SUM(amount), 0) AS n FROM escrow WHERE status = 'locked'")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n"))
}

pub async fn create_account(
    pool: &SqlitePool,
    account_id: &str,
    initial_balance: i64,
) -> ServiceResult<Account> {
    let mut conn = begin_immediate(pool).await?;
    match create_account_inner(&mut conn, account_id, initial_balance).await {
        Ok(account) => {
            commit(conn).await?;
            Ok(account)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn create_account_inner(
    conn: &mut PoolConnection<Sqlite>,
    account_id: &str,
    initial_balance: i64,
) -> ServiceResult<Account> {
    let created_at = chrono::Utc::now();
    let result = sqlx::query("INSERT INTO accounts (account_id, balance, created_at) VALUES (?, ?, ?)")
        .bind(account_id)
        .bind(initial_balance)
        .bind(created_at.to_rfc3339())
        .execute(&mut **conn)
        .await;

    match result {
        Ok(_) => Ok(Account {
            account_id: account_id.to_string(),
            balance: initial_balance,
            created_at,
        }),
        Err(e) if is_unique_violation(&e) => Err(ServiceError::new(
            ErrorCode::AccountExists,
            "account already exists",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Credit with the two-layer idempotency pattern on `(account_id, reference)`.
pub async fn credit(
    pool: &SqlitePool,
    account_id: &str,
    amount: i64,
    reference: &str,
) -> ServiceResult<Transaction> {
    if let Some(existing) = find_credit_by_reference(pool, account_id, reference).await? {
        return if existing.amount == amount {
            Ok(existing)
        } else {
            Err(ServiceError::new(
                ErrorCode::PayloadMismatch,
                "a credit with this reference already exists with a different amount",
            ))
        };
    }

    let mut conn = begin_immediate(pool).await?;
    match credit_inner(&mut conn, account_id, amount, reference).await {
        Ok(tx) => {
            commit(conn).await?;
            Ok(tx)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn find_credit_by_reference<'e, E>(
    executor: E,
    account_id: &str,
    reference: &str,
) -> ServiceResult<Option<Transaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT * FROM transactions WHERE account_id = ? AND reference = ? AND kind = 'credit'",
    )
    .bind(account_id)
    .bind(reference)
    .fetch_optional(executor)
    .await?;
    Ok(row.as_ref().map(row_to_transaction))
}

async fn credit_inner(
    conn: &mut PoolConnection<Sqlite>,
    account_id: &str,
    amount: i64,
    reference: &str,
) -> ServiceResult<Transaction> {
    let update = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE account_id = ?")
        .bind(amount)
        .bind(account_id)
        .execute(&mut **conn)
        .await?;
    if update.rows_affected() == 0 {
        return Err(ServiceError::new(ErrorCode::AccountNotFound, "account not found"));
    }

    let balance_after = get_balance(&mut **conn, account_id).await?;
    let tx_id = new_tx_id();
    let timestamp = chrono::Utc::now();

    let insert = sqlx::query(
        "INSERT INTO transactions (tx_id, account_id, kind, amount, balance_after, reference, timestamp) VALUES (?, 'credit', ?, ?, ?, ?, ?)",
    )
    .bind(&tx_id)
    .bind(account_id)
    .bind(amount)
    .bind(balance_after)
    .bind(reference)
    .bind(timestamp.to_rfc3339())
    .execute(&mut **conn)
    .await;

    match insert {
        Ok(_) => Ok(Transaction {
            tx_id,
            account_id: account_id.to_string(),
            kind: "credit".to_string(),
            amount,
            balance_after,
            reference: Some(reference.to_string()),
            timestamp,
        }),
        Err(e) if is_unique_violation(&e) => {
            // Raced with another credit carrying the same reference: resolve
            // exactly as the optimistic pre-check would have.
            find_credit_by_reference(&mut **conn, account_id, reference)
                .await?
                .ok_or_else(|| ServiceError::internal("lost a concurrently-inserted credit"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_balance<'e, E>(executor: E, account_id: &str) -> ServiceResult<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT balance FROM accounts WHERE account_id = ?")
        .bind(account_id)
        .fetch_one(executor)
        .await?;
    Ok(row.get::<i64, _>("balance"))
}

async fn find_locked_escrow<'e, E>(
    executor: E,
    payer_account_id: &str,
    task_id: &str,
) -> ServiceResult<Option<Escrow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT * FROM escrow WHERE payer_account_id = ? AND task_id = ? AND status = 'locked'",
    )
    .bind(payer_account_id)
    .bind(task_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.as_ref().map(row_to_escrow))
}

pub async fn escrow_lock(
    pool: &SqlitePool,
    payer_account_id: &str,
    task_id: &str,
    amount: i64,
) -> ServiceResult<Escrow> {
    if let Some(existing) = find_locked_escrow(pool, payer_account_id, task_id).await? {
        return if existing.amount == amount {
            Ok(existing)
        } else {
            Err(ServiceError::new(
                ErrorCode::EscrowAlreadyLocked,
                "an escrow for this task is already locked with a different amount",
            ))
        };
    }

    let mut conn = begin_immediate(pool).await?;
    match escrow_lock_inner(&mut conn, payer_account_id, task_id, amount).await {
        Ok(escrow) => {
            commit(conn).await?;
            Ok(escrow)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn escrow_lock_inner(
    conn: &mut PoolConnection<Sqlite>,
    payer_account_id: &str,
    task_id: &str,
    amount: i64,
) -> ServiceResult<Escrow> {
    let update = sqlx::query(
        "UPDATE accounts SET balance = balance - ? WHERE account_id = ? AND balance >= ?",
    )
    .bind(amount)
    .bind(payer_account_id)
    .bind(amount)
    .execute(&mut **conn)
    .await?;

    if update.rows_affected() == 0 {
        return match get_account(&mut **conn, payer_account_id).await? {
            None => Err(ServiceError::new(ErrorCode::AccountNotFound, "payer account not found")),
            Some(_) => Err(ServiceError::new(ErrorCode::InsufficientFunds, "insufficient funds")),
        };
    }

    let escrow_id = new_escrow_id();
    let tx_id = new_tx_id();
    let now = chrono::Utc::now();

    let insert_escrow = sqlx::query(
        "INSERT INTO escrow (escrow_id, payer_account_id, amount, task_id, status, created_at) VALUES (?, ?, ?, ?, 'locked', ?)",
    )
    .bind(&escrow_id)
    .bind(payer_account_id)
    .bind(amount)
    .bind(task_id)
    .bind(now.to_rfc3339())
    .execute(&mut **conn)
    .await;

    match insert_escrow {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return find_locked_escrow(&mut **conn, payer_account_id, task_id)
                .await?
                .ok_or_else(|| ServiceError::internal("lost a concurrently-inserted escrow"));
        }
        Err(e) => return Err(e.into()),
    }

    let balance_after = get_balance(&mut **conn, payer_account_id).await?;
    sqlx::query(
        "INSERT INTO transactions (tx_id, account_id, kind, amount, balance_after, reference, timestamp) VALUES (?, ?, 'escrow_lock', ?, ?, ?, ?)",
    )
    .bind(&tx_id)
    .bind(payer_account_id)
    .bind(amount)
    .bind(balance_after)
    .bind(&escrow_id)
    .bind(now.to_rfc3339())
    .execute(&mut **conn)
    .await?;

    Ok(Escrow {
        escrow_id,
        payer_account_id: payer_account_id.to_string(),
        amount,
        task_id: task_id.to_string(),
        status: EscrowStatus::Locked,
        created_at: now,
        resolved_at: None,
    })
}

pub async fn get_escrow(pool: &SqlitePool, escrow_id: &str) -> ServiceResult<Option<Escrow>> {
    get_escrow_via(pool, escrow_id).await
}

async fn get_escrow_via<'e, E>(executor: E, escrow_id: &str) -> ServiceResult<Option<Escrow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM escrow WHERE escrow_id = ?")
        .bind(escrow_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.as_ref().map(row_to_escrow))
}

/// Credits `amount` to `account_id` as a single leg of an escrow resolution.
/// A zero amount is a no-op (covers `worker_pct` of 0 or 100 in a split).
async fn credit_leg(
    conn: &mut PoolConnection<Sqlite>,
    account_id: &str,
    amount: i64,
    reference: &str,
    kind: &str,
) -> ServiceResult<()> {
    if amount == 0 {
        return Ok(());
    }
    let update = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE account_id = ?")
        .bind(amount)
        .bind(account_id)
        .execute(&mut **conn)
        .await?;
    if update.rows_affected() == 0 {
        return Err(ServiceError::new(ErrorCode::AccountNotFound, "recipient account not found"));
    }
    let balance_after = get_balance(&mut **conn, account_id).await?;
    sqlx::query(
        "INSERT INTO transactions (tx_id, account_id, kind, amount, balance_after, reference, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_tx_id())
    .bind(account_id)
    .bind(kind)
    .bind(amount)
    .bind(balance_after)
    .bind(reference)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut **conn)
    .await?;
    Ok(())
}

pub async fn escrow_release(
    pool: &SqlitePool,
    escrow_id: &str,
    recipient_account_id: &str,
) -> ServiceResult<Escrow> {
    let mut conn = begin_immediate(pool).await?;
    match escrow_release_inner(&mut conn, escrow_id, recipient_account_id).await {
        Ok(escrow) => {
            commit(conn).await?;
            Ok(escrow)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn escrow_release_inner(
    conn: &mut PoolConnection<Sqlite>,
    escrow_id: &str,
    recipient_account_id: &str,
) -> ServiceResult<Escrow> {
    let escrow = get_escrow_via(&mut **conn, escrow_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::EscrowNotFound, "escrow not found"))?;
    if escrow.status != EscrowStatus::Locked {
        return Err(ServiceError::new(
            ErrorCode::EscrowAlreadyResolved,
            "escrow has already been resolved",
        ));
    }

    credit_leg(conn, recipient_account_id, escrow.amount, escrow_id, "escrow_release").await?;

    let resolved_at = chrono::Utc::now();
    let update = sqlx::query(
        "UPDATE escrow SET status = 'released', resolved_at = ? WHERE escrow_id = ? AND status = 'locked'",
    )
    .bind(resolved_at.to_rfc3339())
    .bind(escrow_id)
    .execute(&mut **conn)
    .await?;

    if update.rows_affected() != 1 {
        return Err(ServiceError::new(
            ErrorCode::EscrowAlreadyResolved,
            "escrow was resolved concurrently",
        ));
    }

    Ok(Escrow {
        status: EscrowStatus::Released,
        resolved_at: Some(resolved_at),
        ..escrow
    })
}

pub async fn escrow_split(
    pool: &SqlitePool,
    escrow_id: &str,
    worker_pct: i64,
    worker_account_id: &str,
    poster_account_id: &str,
) -> ServiceResult<Escrow> {
    let mut conn = begin_immediate(pool).await?;
    match escrow_split_inner(&mut conn, escrow_id, worker_pct, worker_account_id, poster_account_id).await {
        Ok(escrow) => {
            commit(conn).await?;
            Ok(escrow)
        }
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn escrow_split_inner(
    conn: &mut PoolConnection<Sqlite>,
    escrow_id: &str,
    worker_pct: i64,
    worker_account_id: &str,
    poster_account_id: &str,
) -> ServiceResult<Escrow> {
    if !(0..=100).contains(&worker_pct) {
        return Err(ServiceError::new(ErrorCode::InvalidWorkerPct, "worker_pct must be within 0..=100"));
    }

    let escrow = get_escrow_via(&mut **conn, escrow_id)
        .await?
        .ok_or_else(|| ServiceError::new(ErrorCode::EscrowNotFound, "escrow not found"))?;
    if escrow.status != EscrowStatus::Locked {
        return Err(ServiceError::new(
            ErrorCode::EscrowAlreadyResolved,
            "escrow has already been resolved",
        ));
    }
    if escrow.payer_account_id != poster_account_id {
        return Err(ServiceError::new(
            ErrorCode::PayloadMismatch,
            "poster_account_id does not match the escrow's original payer",
        ));
    }

    // floor division, remainder to the poster - never recomputed from the
    // percentage, so the split is exact even with rounding.
    let worker_amount = escrow.amount * worker_pct / 100;
    let poster_amount = escrow.amount - worker_amount;

    credit_leg(conn, worker_account_id, worker_amount, escrow_id, "escrow_release").await?;
    credit_leg(conn, poster_account_id, poster_amount, escrow_id, "escrow_release").await?;

    let resolved_at = chrono::Utc::now();
    let update = sqlx::query(
        "UPDATE escrow SET status = 'split', resolved_at = ? WHERE escrow_id = ? AND status = 'locked'",
    )
    .bind(resolved_at.to_rfc3339())
    .bind(escrow_id)
    .execute(&mut **conn)
    .await?;

    if update.rows_affected() != 1 {
        return Err(ServiceError::new(
            ErrorCode::EscrowAlreadyResolved,
            "escrow was resolved concurrently",
        ));
    }

    Ok(Escrow {
        status: EscrowStatus::Split,
        resolved_at: Some(resolved_at),
        ..escrow
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `escrow_split`'s floor-division invariant: the remainder from integer
    /// division always lands with the poster, and the two legs always sum
    /// back to the full escrowed amount regardless of how `worker_pct`
    /// rounds.
    #[test]
    fn split_floor_division_remainder_goes_to_poster() {
        let cases: &[(i64, i64, i64, i64)] = &[
            (100, 50, 50, 50),
            (101, 50, 50, 51),
            (10, 33, 3, 7),
            (1, 40, 0, 1),
            (7, 100, 7, 0),
            (7, 0, 0, 7),
        ];
        for &(amount, worker_pct, expected_worker, expected_poster) in cases {
            let worker_amount = amount * worker_pct / 100;
            let poster_amount = amount - worker_amount;
            assert_eq!(worker_amount, expected_worker, "amount={amount} worker_pct={worker_pct}");
            assert_eq!(poster_amount, expected_poster, "amount={amount} worker_pct={worker_pct}");
            assert_eq!(worker_amount + poster_amount, amount);
        }
    }
}
