use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::Store;
use crate::{
    error::Result,
    queue::{NewCandidate, WorkItem},
    sink::BalanceRecord,
};

/// Tables for the work queue (`candidates`) and funded addresses (`found`).
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS candidates (
    seq BIGSERIAL PRIMARY KEY,
    address TEXT NOT NULL,
    extended_private_key TEXT,
    extended_public_key TEXT,
    phrase TEXT NOT NULL,
    scheme TEXT NOT NULL,
    used BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS candidates_unused_idx
    ON candidates (used, created_at, seq);

CREATE INDEX IF NOT EXISTS candidates_address_idx
    ON candidates (address);

CREATE TABLE IF NOT EXISTS found (
    id BIGSERIAL PRIMARY KEY,
    address TEXT NOT NULL,
    extended_private_key TEXT,
    extended_public_key TEXT,
    phrase TEXT NOT NULL,
    balance BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const CANDIDATE_COLUMNS: &str =
    "seq, address, extended_private_key, extended_public_key, phrase, scheme, used, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!("✅ Connected to database");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<WorkItem> {
        let item = sqlx::query_as::<_, WorkItem>(&format!(
            r#"
            INSERT INTO candidates (address, extended_private_key, extended_public_key, phrase, scheme)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(&candidate.address)
        .bind(&candidate.extended_private_key)
        .bind(&candidate.extended_public_key)
        .bind(&candidate.phrase)
        .bind(candidate.scheme.name())
        .fetch_one(&self.pool)
        .await?;

        Ok(item)
    }

    async fn claim_next(&self) -> Result<Option<WorkItem>> {
        // Row lock plus SKIP LOCKED: concurrent claimers pick different rows
        let item = sqlx::query_as::<_, WorkItem>(&format!(
            r#"
            UPDATE candidates SET used = TRUE
            WHERE seq = (
                SELECT seq FROM candidates
                WHERE used = FALSE
                ORDER BY created_at ASC, seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND used = FALSE
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn mark_used(&self, address: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE candidates SET used = TRUE WHERE address = $1 AND used = FALSE")
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_unused(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates WHERE used = FALSE")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert_found(&self, record: &BalanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO found (address, extended_private_key, extended_public_key, phrase, balance, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.address)
        .bind(&record.extended_private_key)
        .bind(&record.extended_public_key)
        .bind(&record.phrase)
        .bind(record.balance)
        .bind(record.observed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn found(&self) -> Result<Vec<BalanceRecord>> {
        let records = sqlx::query_as::<_, BalanceRecord>(
            r#"
            SELECT address, extended_private_key, extended_public_key, phrase, balance, created_at
            FROM found ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
