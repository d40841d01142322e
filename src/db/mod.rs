//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Tables backing [`PgLedger`](crate::ledger::PgLedger) and
/// [`PgJournal`](crate::transfer::journal::PgJournal).
///
/// `ledger_ops_tb` is keyed by `(transfer_id, leg)`: a leg can be applied to
/// the ledger at most once. A `voided` row is a fence: the leg never applies.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts_tb (
        account_id  TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        balance     NUMERIC(38, 18) NOT NULL CHECK (balance >= 0),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_ops_tb (
        transfer_id TEXT NOT NULL,
        leg         SMALLINT NOT NULL,
        account_id  TEXT NOT NULL,
        amount      NUMERIC(38, 18) NOT NULL,
        voided      BOOLEAN NOT NULL DEFAULT FALSE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (transfer_id, leg)
    )
    "#,
    // Fences may name an account that does not exist
    "ALTER TABLE ledger_ops_tb DROP CONSTRAINT IF EXISTS ledger_ops_tb_account_id_fkey",
    "ALTER TABLE ledger_ops_tb ADD COLUMN IF NOT EXISTS voided BOOLEAN NOT NULL DEFAULT FALSE",
    r#"
    CREATE TABLE IF NOT EXISTS transfers_tb (
        transfer_id      TEXT PRIMARY KEY,
        cid              TEXT,
        caller_id        TEXT NOT NULL,
        from_id          TEXT NOT NULL,
        to_id            TEXT NOT NULL,
        amount           NUMERIC(38, 18) NOT NULL,
        state            SMALLINT NOT NULL,
        error_message    TEXT,
        retry_count      INTEGER NOT NULL DEFAULT 0,
        sender_balance   NUMERIC(38, 18),
        receiver_balance NUMERIC(38, 18),
        created_at       BIGINT NOT NULL,
        updated_at       BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS transfers_caller_cid_idx
        ON transfers_tb (caller_id, cid) WHERE cid IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transfers_state_updated_idx
        ON transfers_tb (state, updated_at)
    "#,
];

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(50)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create ledger and journal tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(tables = 3, "Ledger schema ready");
        Ok(())
    }
}

/// Current wall-clock time in milliseconds (journal timestamps)
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
