//! Fault-injecting ledger for saga tests
//!
//! Wraps a [`MemoryLedger`] and fails or delays selected legs on demand.
//! A credit can be delayed before it applies (never lands in time) or after
//! (lands, but the acknowledgement is late).

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{AccountLedger, Leg, LedgerError, MemoryLedger, OpKey, VoidOutcome};
use crate::account::Account;
use crate::core_types::AccountId;
use crate::money::Amount;

pub struct FaultyLedger {
    inner: Arc<MemoryLedger>,
    fail_debit: AtomicBool,
    fail_credit: AtomicBool,
    /// Number of upcoming refunds to fail
    fail_refunds: AtomicUsize,
    credit_delay_ms: AtomicU64,
    credit_ack_delay_ms: AtomicU64,
    fail_void: AtomicBool,
    debit_calls: AtomicUsize,
    credit_calls: AtomicUsize,
    refund_calls: AtomicUsize,
}

impl FaultyLedger {
    pub fn new(inner: Arc<MemoryLedger>) -> Self {
        Self {
            inner,
            fail_debit: AtomicBool::new(false),
            fail_credit: AtomicBool::new(false),
            fail_refunds: AtomicUsize::new(0),
            credit_delay_ms: AtomicU64::new(0),
            credit_ack_delay_ms: AtomicU64::new(0),
            fail_void: AtomicBool::new(false),
            debit_calls: AtomicUsize::new(0),
            credit_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    pub fn set_fail_debit(&self, fail: bool) {
        self.fail_debit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_credit(&self, fail: bool) {
        self.fail_credit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_refunds(&self, count: usize) {
        self.fail_refunds.store(count, Ordering::SeqCst);
    }

    pub fn set_credit_delay(&self, delay: Duration) {
        self.credit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Apply the credit, then hold the reply for `delay`
    pub fn set_credit_ack_delay(&self, delay: Duration) {
        self.credit_ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_void(&self, fail: bool) {
        self.fail_void.store(fail, Ordering::SeqCst);
    }

    pub fn debit_calls(&self) -> usize {
        self.debit_calls.load(Ordering::SeqCst)
    }

    pub fn credit_calls(&self) -> usize {
        self.credit_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }

    fn take_refund_failure(&self) -> bool {
        self.fail_refunds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AccountLedger for FaultyLedger {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.inner.get(account_id).await
    }

    async fn conditional_debit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        self.debit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_debit.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected debit failure".into()));
        }
        self.inner.conditional_debit(op, account_id, amount).await
    }

    async fn credit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        if op.leg == Leg::Refund {
            self.refund_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_refund_failure() {
                return Err(LedgerError::Unavailable("injected refund failure".into()));
            }
            return self.inner.credit(op, account_id, amount).await;
        }

        self.credit_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.credit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_credit.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected credit failure".into()));
        }
        let result = self.inner.credit(op, account_id, amount).await;
        let ack_delay = self.credit_ack_delay_ms.load(Ordering::SeqCst);
        if ack_delay > 0 {
            tokio::time::sleep(Duration::from_millis(ack_delay)).await;
        }
        result
    }

    async fn void(&self, op: OpKey, account_id: &AccountId) -> Result<VoidOutcome, LedgerError> {
        if self.fail_void.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected void failure".into()));
        }
        self.inner.void(op, account_id).await
    }

    async fn open_account(
        &self,
        account_id: AccountId,
        name: &str,
        balance: Decimal,
    ) -> Result<Account, LedgerError> {
        self.inner.open_account(account_id, name, balance).await
    }
}
