//! Fault-injecting journal for saga tests
//!
//! Wraps a [`MemoryJournal`]; selected writes fail with `Unavailable`
//! without touching the inner store.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{JournalError, MemoryJournal, TransferJournal};
use crate::core_types::TransferId;
use crate::transfer::state::TransferState;
use crate::transfer::types::TransferRecord;

pub struct FaultyJournal {
    inner: Arc<MemoryJournal>,
    fail_create: AtomicBool,
    fail_complete: AtomicBool,
    fail_increment_retry: AtomicBool,
    /// Transitions into these states fail
    fail_into: Mutex<Vec<TransferState>>,
}

impl FaultyJournal {
    pub fn new(inner: Arc<MemoryJournal>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_complete: AtomicBool::new(false),
            fail_increment_retry: AtomicBool::new(false),
            fail_into: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &MemoryJournal {
        &self.inner
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_increment_retry(&self, fail: bool) {
        self.fail_increment_retry.store(fail, Ordering::SeqCst);
    }

    pub fn fail_transitions_into(&self, state: TransferState) {
        self.fail_into.lock().unwrap().push(state);
    }

    /// Stop injecting any fault
    pub fn heal(&self) {
        self.set_fail_create(false);
        self.set_fail_complete(false);
        self.set_fail_increment_retry(false);
        self.fail_into.lock().unwrap().clear();
    }

    fn check(&self, fail: bool, what: &str) -> Result<(), JournalError> {
        if fail {
            return Err(JournalError::Unavailable(format!("injected {} failure", what)));
        }
        Ok(())
    }

    fn check_into(&self, new: TransferState) -> Result<(), JournalError> {
        let fail = self.fail_into.lock().unwrap().contains(&new);
        self.check(fail, new.as_str())
    }
}

#[async_trait]
impl TransferJournal for FaultyJournal {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn create(
        &self,
        record: &TransferRecord,
    ) -> Result<Option<TransferRecord>, JournalError> {
        self.check(self.fail_create.load(Ordering::SeqCst), "create")?;
        self.inner.create(record).await
    }

    async fn get(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>, JournalError> {
        self.inner.get(transfer_id).await
    }

    async fn update_state_if(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
    ) -> Result<bool, JournalError> {
        self.check_into(new)?;
        self.inner.update_state_if(transfer_id, expected, new).await
    }

    async fn update_state_with_error(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
        error: &str,
    ) -> Result<bool, JournalError> {
        self.check_into(new)?;
        self.inner
            .update_state_with_error(transfer_id, expected, new, error)
            .await
    }

    async fn complete(
        &self,
        transfer_id: TransferId,
        sender_balance: Option<Decimal>,
        receiver_balance: Decimal,
    ) -> Result<bool, JournalError> {
        self.check(self.fail_complete.load(Ordering::SeqCst), "complete")?;
        self.inner
            .complete(transfer_id, sender_balance, receiver_balance)
            .await
    }

    async fn increment_retry(&self, transfer_id: TransferId) -> Result<(), JournalError> {
        self.check(
            self.fail_increment_retry.load(Ordering::SeqCst),
            "increment_retry",
        )?;
        self.inner.increment_retry(transfer_id).await
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, JournalError> {
        self.inner.find_stale(threshold, limit).await
    }
}
