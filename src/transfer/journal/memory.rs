//! In-memory journal
//!
//! Used by the memory backend and the saga tests. `(caller, cid)` uniqueness
//! is enforced through the index entry lock, which is held while the record
//! itself is inserted.
//!
//! Records are kept until [`MemoryJournal::prune_terminal`] drops them, so
//! the `(caller, cid)` idempotency window is the retention period.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::time::Duration;

use super::{JournalError, TransferJournal};
use crate::core_types::{AccountId, TransferId};
use crate::db::now_ms;
use crate::transfer::state::TransferState;
use crate::transfer::types::TransferRecord;

#[derive(Default)]
pub struct MemoryJournal {
    records: DashMap<TransferId, TransferRecord>,
    by_cid: DashMap<(AccountId, String), TransferId>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record, oldest first
    pub fn records(&self) -> Vec<TransferRecord> {
        let mut all: Vec<TransferRecord> = self.records.iter().map(|r| r.clone()).collect();
        all.sort_by_key(|r| r.transfer_id);
        all
    }

    /// Drop terminal records settled at least `older_than` ago, together
    /// with their cid index entries. Returns the dropped ids.
    pub fn prune_terminal(&self, older_than: Duration) -> Vec<TransferId> {
        let cutoff = now_ms() - older_than.as_millis() as i64;
        let expired = |r: &TransferRecord| r.state.is_terminal() && r.updated_at <= cutoff;

        let candidates: Vec<TransferId> = self
            .records
            .iter()
            .filter(|r| expired(r.value()))
            .map(|r| r.transfer_id)
            .collect();

        // One map locked at a time: `create` takes the cid entry first.
        let mut pruned = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some((_, record)) = self.records.remove_if(&id, |_, r| expired(r)) else {
                continue;
            };
            if let Some(cid) = record.cid {
                self.by_cid
                    .remove_if(&(record.caller, cid), |_, indexed| *indexed == id);
            }
            pruned.push(id);
        }
        pruned
    }

    /// Shift `updated_at` into the past (recovery tests)
    #[cfg(test)]
    pub fn backdate(&self, transfer_id: TransferId, by: Duration) {
        if let Some(mut record) = self.records.get_mut(&transfer_id) {
            record.updated_at -= by.as_millis() as i64;
        }
    }

    fn cas<F>(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        apply: F,
    ) -> Result<bool, JournalError>
    where
        F: FnOnce(&mut TransferRecord),
    {
        let mut record = self
            .records
            .get_mut(&transfer_id)
            .ok_or(JournalError::NotFound(transfer_id))?;

        if record.state != expected {
            return Ok(false);
        }
        apply(&mut record);
        record.updated_at = now_ms();
        Ok(true)
    }
}

#[async_trait]
impl TransferJournal for MemoryJournal {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        record: &TransferRecord,
    ) -> Result<Option<TransferRecord>, JournalError> {
        let Some(cid) = &record.cid else {
            self.records.insert(record.transfer_id, record.clone());
            return Ok(None);
        };

        match self.by_cid.entry((record.caller.clone(), cid.clone())) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let existing = self
                    .records
                    .get(&id)
                    .map(|r| r.clone())
                    .ok_or_else(|| JournalError::Corrupt(format!("cid index points to {}", id)))?;
                Ok(Some(existing))
            }
            Entry::Vacant(slot) => {
                self.records.insert(record.transfer_id, record.clone());
                slot.insert(record.transfer_id);
                Ok(None)
            }
        }
    }

    async fn get(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>, JournalError> {
        Ok(self.records.get(&transfer_id).map(|r| r.clone()))
    }

    async fn update_state_if(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
    ) -> Result<bool, JournalError> {
        self.cas(transfer_id, expected, |r| r.state = new)
    }

    async fn update_state_with_error(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
        error: &str,
    ) -> Result<bool, JournalError> {
        self.cas(transfer_id, expected, |r| {
            r.state = new;
            r.error = Some(error.to_string());
        })
    }

    async fn complete(
        &self,
        transfer_id: TransferId,
        sender_balance: Option<Decimal>,
        receiver_balance: Decimal,
    ) -> Result<bool, JournalError> {
        self.cas(transfer_id, TransferState::Crediting, |r| {
            r.state = TransferState::Completed;
            r.sender_balance = sender_balance;
            r.receiver_balance = Some(receiver_balance);
        })
    }

    async fn increment_retry(&self, transfer_id: TransferId) -> Result<(), JournalError> {
        let mut record = self
            .records
            .get_mut(&transfer_id)
            .ok_or(JournalError::NotFound(transfer_id))?;
        record.retry_count += 1;
        record.updated_at = now_ms();
        Ok(())
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, JournalError> {
        let cutoff = now_ms() - threshold.as_millis() as i64;

        let mut stale: Vec<TransferRecord> = self
            .records
            .iter()
            .filter(|r| !r.state.is_terminal() && r.updated_at < cutoff)
            .map(|r| r.clone())
            .collect();

        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}
