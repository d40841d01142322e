//! PostgreSQL journal (`transfers_tb`)
//!
//! All state updates use atomic CAS (`WHERE state = $expected`).

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::{JournalError, TransferJournal};
use crate::core_types::{AccountId, TransferId};
use crate::db::now_ms;
use crate::money::Amount;
use crate::transfer::state::TransferState;
use crate::transfer::types::TransferRecord;

const SELECT_COLUMNS: &str = r#"
    SELECT transfer_id, cid, caller_id, from_id, to_id, amount, state,
           error_message, retry_count, sender_balance, receiver_balance,
           created_at, updated_at
    FROM transfers_tb
"#;

pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_by_cid(
        &self,
        caller: &AccountId,
        cid: &str,
    ) -> Result<Option<TransferRecord>, JournalError> {
        let row = sqlx::query(&format!(
            "{} WHERE caller_id = $1 AND cid = $2",
            SELECT_COLUMNS
        ))
        .bind(caller.as_str())
        .bind(cid)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }
}

fn row_to_record(row: &PgRow) -> Result<TransferRecord, JournalError> {
    let transfer_id_str: String = row.try_get("transfer_id")?;
    let transfer_id: TransferId = transfer_id_str
        .parse()
        .map_err(|_| JournalError::Corrupt(format!("invalid transfer_id {}", transfer_id_str)))?;

    let state_id: i16 = row.try_get("state")?;
    let state = TransferState::from_id(state_id)
        .ok_or_else(|| JournalError::Corrupt(format!("invalid state id {}", state_id)))?;

    let amount: Decimal = row.try_get("amount")?;
    let amount = Amount::new(amount.normalize())
        .map_err(|e| JournalError::Corrupt(format!("{}: {}", transfer_id, e)))?;

    Ok(TransferRecord {
        transfer_id,
        cid: row.try_get("cid")?,
        caller: AccountId::new(row.try_get::<String, _>("caller_id")?),
        from: AccountId::new(row.try_get::<String, _>("from_id")?),
        to: AccountId::new(row.try_get::<String, _>("to_id")?),
        amount,
        state,
        error: row.try_get("error_message")?,
        retry_count: row.try_get("retry_count")?,
        sender_balance: row
            .try_get::<Option<Decimal>, _>("sender_balance")?
            .map(|d| d.normalize()),
        receiver_balance: row
            .try_get::<Option<Decimal>, _>("receiver_balance")?
            .map(|d| d.normalize()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TransferJournal for PgJournal {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create(
        &self,
        record: &TransferRecord,
    ) -> Result<Option<TransferRecord>, JournalError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO transfers_tb
                (transfer_id, cid, caller_id, from_id, to_id, amount, state,
                 retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $8)
            ON CONFLICT (caller_id, cid) WHERE cid IS NOT NULL DO NOTHING
            "#,
        )
        .bind(record.transfer_id.to_string())
        .bind(&record.cid)
        .bind(record.caller.as_str())
        .bind(record.from.as_str())
        .bind(record.to.as_str())
        .bind(record.amount.value())
        .bind(record.state.id())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            return Ok(None);
        }

        let Some(cid) = &record.cid else {
            return Err(JournalError::Corrupt(format!(
                "insert of {} affected no rows",
                record.transfer_id
            )));
        };

        let existing = self.get_by_cid(&record.caller, cid).await?.ok_or_else(|| {
            JournalError::Corrupt(format!("cid {} conflicted but no record found", cid))
        })?;

        tracing::info!(
            transfer_id = %existing.transfer_id,
            cid = %cid,
            "Transfer with cid already exists - returning existing record"
        );
        Ok(Some(existing))
    }

    async fn get(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>, JournalError> {
        let row = sqlx::query(&format!("{} WHERE transfer_id = $1", SELECT_COLUMNS))
            .bind(transfer_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_state_if(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
    ) -> Result<bool, JournalError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET state = $1, updated_at = $2
            WHERE transfer_id = $3 AND state = $4
            "#,
        )
        .bind(new.id())
        .bind(now_ms())
        .bind(transfer_id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_state_with_error(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
        error: &str,
    ) -> Result<bool, JournalError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET state = $1, error_message = $2, updated_at = $3
            WHERE transfer_id = $4 AND state = $5
            "#,
        )
        .bind(new.id())
        .bind(error)
        .bind(now_ms())
        .bind(transfer_id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        transfer_id: TransferId,
        sender_balance: Option<Decimal>,
        receiver_balance: Decimal,
    ) -> Result<bool, JournalError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET state = $1, sender_balance = $2, receiver_balance = $3, updated_at = $4
            WHERE transfer_id = $5 AND state = $6
            "#,
        )
        .bind(TransferState::Completed.id())
        .bind(sender_balance)
        .bind(receiver_balance)
        .bind(now_ms())
        .bind(transfer_id.to_string())
        .bind(TransferState::Crediting.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_retry(&self, transfer_id: TransferId) -> Result<(), JournalError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET retry_count = retry_count + 1, updated_at = $1
            WHERE transfer_id = $2
            "#,
        )
        .bind(now_ms())
        .bind(transfer_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JournalError::NotFound(transfer_id));
        }
        Ok(())
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, JournalError> {
        let cutoff = now_ms() - threshold.as_millis() as i64;
        let states: Vec<i16> = TransferState::RESUMABLE.iter().map(|s| s.id()).collect();

        let rows = sqlx::query(&format!(
            "{} WHERE state = ANY($1) AND updated_at < $2 ORDER BY updated_at ASC LIMIT $3",
            SELECT_COLUMNS
        ))
        .bind(&states)
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
