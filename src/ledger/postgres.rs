//! PostgreSQL ledger
//!
//! Balances live in `accounts_tb`; each applied leg is recorded in
//! `ledger_ops_tb` inside the same transaction as the balance change.
//!
//! The conditional debit is a single guarded statement:
//!
//! ```sql
//! UPDATE accounts_tb SET balance = balance - $2
//! WHERE account_id = $1 AND balance >= $2
//! RETURNING ...
//! ```
//!
//! Row-level locking makes the guard and the decrement indivisible, so two
//! concurrent debits can never both pass against a stale balance.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{AccountLedger, LedgerError, OpKey, VoidOutcome};
use crate::account::Account;
use crate::core_types::AccountId;
use crate::money::Amount;

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &PgRow) -> Result<Account, LedgerError> {
        let id: String = row.try_get("account_id")?;
        let name: String = row.try_get("name")?;
        let balance: Decimal = row.try_get("balance")?;
        // NUMERIC(38, 18) pads trailing zeros
        Ok(Account::new(AccountId::new(id), name, balance.normalize()))
    }

    async fn fetch_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        account_id: &AccountId,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(
            "SELECT account_id, name, balance FROM accounts_tb WHERE account_id = $1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Claim the op key. `false` means the leg was already applied.
    async fn claim_op(
        tx: &mut Transaction<'_, Postgres>,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_ops_tb (transfer_id, leg, account_id, amount)
            SELECT $1, $2, account_id, $4 FROM accounts_tb WHERE account_id = $3
            ON CONFLICT (transfer_id, leg) DO NOTHING
            "#,
        )
        .bind(op.transfer_id.to_string())
        .bind(op.leg.id())
        .bind(account_id.as_str())
        .bind(amount.value())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// `None` if the op key is free, else `Some(voided)`
    async fn op_state(
        tx: &mut Transaction<'_, Postgres>,
        op: OpKey,
    ) -> Result<Option<bool>, LedgerError> {
        let voided: Option<bool> = sqlx::query_scalar(
            "SELECT voided FROM ledger_ops_tb WHERE transfer_id = $1 AND leg = $2",
        )
        .bind(op.transfer_id.to_string())
        .bind(op.leg.id())
        .fetch_optional(&mut **tx)
        .await?;
        Ok(voided)
    }
}

#[async_trait]
impl AccountLedger for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            "SELECT account_id, name, balance FROM accounts_tb WHERE account_id = $1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_account(&row),
            None => Err(LedgerError::NotFound(account_id.clone())),
        }
    }

    async fn conditional_debit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if !Self::claim_op(&mut tx, op, account_id, amount).await? {
            // Either the leg was applied before, or the account is absent
            // (the INSERT ... SELECT found no row).
            let state = Self::op_state(&mut tx, op).await?;
            let account = Self::fetch_in_tx(&mut tx, account_id).await?;
            tx.commit().await?;
            return match (state, account) {
                (Some(true), _) => Err(LedgerError::Voided(op)),
                (Some(false), Some(account)) => {
                    debug!(op = %op, account_id = %account_id, "Debit already applied");
                    Ok(account)
                }
                _ => Err(LedgerError::Rejected(account_id.clone())),
            };
        }

        let row = sqlx::query(
            r#"
            UPDATE accounts_tb
            SET balance = balance - $2, updated_at = NOW()
            WHERE account_id = $1 AND balance >= $2
            RETURNING account_id, name, balance
            "#,
        )
        .bind(account_id.as_str())
        .bind(amount.value())
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                let account = Self::row_to_account(&row)?;
                tx.commit().await?;
                Ok(account)
            }
            None => {
                // Releases the claimed op key as well
                tx.rollback().await?;
                Err(LedgerError::Rejected(account_id.clone()))
            }
        }
    }

    async fn credit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if !Self::claim_op(&mut tx, op, account_id, amount).await? {
            let state = Self::op_state(&mut tx, op).await?;
            let account = Self::fetch_in_tx(&mut tx, account_id).await?;
            tx.commit().await?;
            return match (state, account) {
                (Some(true), _) => Err(LedgerError::Voided(op)),
                (Some(false), Some(account)) => {
                    debug!(op = %op, account_id = %account_id, "Credit already applied");
                    Ok(account)
                }
                _ => Err(LedgerError::NotFound(account_id.clone())),
            };
        }

        let row = sqlx::query(
            r#"
            UPDATE accounts_tb
            SET balance = balance + $2, updated_at = NOW()
            WHERE account_id = $1
            RETURNING account_id, name, balance
            "#,
        )
        .bind(account_id.as_str())
        .bind(amount.value())
        .fetch_optional(&mut *tx)
        .await;

        match row {
            Ok(Some(row)) => {
                let account = Self::row_to_account(&row)?;
                tx.commit().await?;
                Ok(account)
            }
            Ok(None) => {
                tx.rollback().await?;
                Err(LedgerError::NotFound(account_id.clone()))
            }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("22003") => {
                // numeric_value_out_of_range
                tx.rollback().await?;
                Err(LedgerError::Overflow(account_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn void(&self, op: OpKey, account_id: &AccountId) -> Result<VoidOutcome, LedgerError> {
        // Conflicts with an uncommitted claim block here until that
        // transaction commits or rolls back
        let claimed = sqlx::query(
            r#"
            INSERT INTO ledger_ops_tb (transfer_id, leg, account_id, amount, voided)
            VALUES ($1, $2, $3, 0, TRUE)
            ON CONFLICT (transfer_id, leg) DO NOTHING
            "#,
        )
        .bind(op.transfer_id.to_string())
        .bind(op.leg.id())
        .bind(account_id.as_str())
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() > 0 {
            debug!(op = %op, account_id = %account_id, "Op voided");
            return Ok(VoidOutcome::Voided);
        }

        let row = sqlx::query(
            "SELECT account_id, voided FROM ledger_ops_tb WHERE transfer_id = $1 AND leg = $2",
        )
        .bind(op.transfer_id.to_string())
        .bind(op.leg.id())
        .fetch_one(&self.pool)
        .await?;

        let voided: bool = row.try_get("voided")?;
        if voided {
            return Ok(VoidOutcome::Voided);
        }
        let applied_to: String = row.try_get("account_id")?;
        self.get(&AccountId::new(applied_to))
            .await
            .map(VoidOutcome::Applied)
    }

    async fn open_account(
        &self,
        account_id: AccountId,
        name: &str,
        balance: Decimal,
    ) -> Result<Account, LedgerError> {
        if balance.is_sign_negative() {
            return Err(LedgerError::InvalidBalance(account_id, balance));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO accounts_tb (account_id, name, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id) DO NOTHING
            RETURNING account_id, name, balance
            "#,
        )
        .bind(account_id.as_str())
        .bind(name)
        .bind(balance)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_account(&row),
            None => Err(LedgerError::AlreadyExists(account_id)),
        }
    }
}
