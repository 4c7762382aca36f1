use agent_economy_common::identity_client::AgentRecord;
use sqlx::SqlitePool;

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id     TEXT PRIMARY KEY,
            display_name TEXT NOT NULL UNIQUE,
            public_key   TEXT NOT NULL UNIQUE,
            created_at   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_agent(
    pool: &SqlitePool,
    agent_id: &str,
    display_name: &str,
    public_key: &str,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO agents (agent_id, display_name, public_key, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(agent_id)
    .bind(display_name)
    .bind(public_key)
    .bind(created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn exists_by_name_or_key(
    pool: &SqlitePool,
    display_name: &str,
    public_key: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM agents WHERE display_name = ? OR public_key = ? LIMIT 1")
            .bind(display_name)
            .bind(public_key)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

pub async fn get_agent(pool: &SqlitePool, agent_id: &str) -> Result<Option<AgentRecord>, sqlx::Error> {
    let row: Option<(String, String, String, String)> = sqlx::query_as(
        "SELECT agent_id, display_name, public_key, created_at FROM agents WHERE agent_id = ?",
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(agent_id, display_name, public_key, created_at)| AgentRecord {
        agent_id,
        display_name,
        public_key,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .expect("created_at is always written as rfc3339")
            .with_timezone(&chrono::Utc),
    }))
}

pub async fn list_agents(pool: &SqlitePool) -> Result<Vec<AgentRecord>, sqlx::Error> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(
        "SELECT agent_id, display_name, public_key, created_at FROM agents ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(agent_id, display_name, public_key, created_at)| AgentRecord {
            agent_id,
            display_name,
            public_key,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .expect("created_at is always written as rfc3339")
                .with_timezone(&chrono::Utc),
        })
        .collect())
}

pub async fn count_agents(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agents")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
