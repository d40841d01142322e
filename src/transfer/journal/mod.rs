//! Transfer Journal
//!
//! Saga intent store. A record is written in DEBITING state before the
//! first ledger mutation and then advanced with compare-and-swap updates,
//! so a crashed or failed transfer always leaves a record the recovery
//! worker can resolve.
//!
//! All state updates are CAS: `update_state_if(id, expected, new)` returns
//! `false` when another actor moved the record first.

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub mod mock;

pub use memory::MemoryJournal;
pub use postgres::PgJournal;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use super::state::TransferState;
use super::types::TransferRecord;
use crate::core_types::TransferId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    #[error("Transfer not found: {0}")]
    NotFound(TransferId),

    #[error("Corrupt journal record: {0}")]
    Corrupt(String),

    #[error("Journal unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for JournalError {
    fn from(e: sqlx::Error) -> Self {
        JournalError::Unavailable(e.to_string())
    }
}

#[async_trait]
pub trait TransferJournal: Send + Sync {
    fn name(&self) -> &'static str;

    /// Insert a new record.
    ///
    /// Idempotent on `(caller, cid)`: if a record with the same key exists,
    /// nothing is written and the existing record is returned.
    async fn create(&self, record: &TransferRecord)
    -> Result<Option<TransferRecord>, JournalError>;

    async fn get(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>, JournalError>;

    /// Atomic CAS update. `false` if the state did not match.
    async fn update_state_if(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
    ) -> Result<bool, JournalError>;

    /// Atomic CAS update recording the failure reason
    async fn update_state_with_error(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
        error: &str,
    ) -> Result<bool, JournalError>;

    /// CAS `CREDITING -> COMPLETED`, storing the post-transfer balances
    async fn complete(
        &self,
        transfer_id: TransferId,
        sender_balance: Option<Decimal>,
        receiver_balance: Decimal,
    ) -> Result<bool, JournalError>;

    async fn increment_retry(&self, transfer_id: TransferId) -> Result<(), JournalError>;

    /// Non-terminal records not updated within `threshold`, oldest first
    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, JournalError>;
}
