//! Account Ledger
//!
//! The single source of truth for account balances. Every mutation is atomic
//! per account: the check-and-decrement of a conditional debit is one
//! indivisible operation, never a read followed by a write.
//!
//! # Backends
//!
//! - [`MemoryLedger`]: `DashMap` entry lock per account
//! - [`PgLedger`]: single conditional `UPDATE ... WHERE balance >= $amount`
//!
//! # Idempotency
//!
//! Every mutation carries an [`OpKey`] (`transfer_id` + [`Leg`]). A key that
//! was already applied returns the current account without mutating again,
//! so the orchestrator and the recovery worker may safely re-issue a leg
//! whose outcome is unknown.
//!
//! # Fencing
//!
//! [`AccountLedger::void`] claims an op key without mutating anything. Once
//! voided, the leg can never apply: a late or re-issued mutation under that
//! key fails with [`LedgerError::Voided`]. The orchestrator voids a leg
//! before acting on the assumption that it did not happen (refunding after
//! a lost credit, reporting a rejected debit).

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub mod mock;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use crate::account::Account;
use crate::core_types::{AccountId, TransferId};
use crate::money::Amount;

/// Which side of a transfer a ledger mutation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum Leg {
    Debit = 1,
    Credit = 2,
    Refund = 3,
}

impl Leg {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Leg::Debit),
            2 => Some(Leg::Credit),
            3 => Some(Leg::Refund),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Debit => "DEBIT",
            Leg::Credit => "CREDIT",
            Leg::Refund => "REFUND",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Idempotency key of a single ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub transfer_id: TransferId,
    pub leg: Leg,
}

impl OpKey {
    pub fn new(transfer_id: TransferId, leg: Leg) -> Self {
        Self { transfer_id, leg }
    }

    pub fn debit(transfer_id: TransferId) -> Self {
        Self::new(transfer_id, Leg::Debit)
    }

    pub fn credit(transfer_id: TransferId) -> Self {
        Self::new(transfer_id, Leg::Credit)
    }

    pub fn refund(transfer_id: TransferId) -> Self {
        Self::new(transfer_id, Leg::Refund)
    }
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transfer_id, self.leg)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Conditional debit refused. Deliberately does not say whether the
    /// account is missing or short of funds; callers disambiguate with `get`.
    #[error("Debit rejected for account {0}")]
    Rejected(AccountId),

    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    #[error("Invalid opening balance {1} for account {0}")]
    InvalidBalance(AccountId, Decimal),

    #[error("Balance overflow on account {0}")]
    Overflow(AccountId),

    /// The op key was voided; this leg will never apply
    #[error("Ledger op {0} was voided")]
    Voided(OpKey),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result of [`AccountLedger::void`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoidOutcome {
    /// The leg is now permanently blocked (or already was)
    Voided,
    /// The leg had already been applied; current account snapshot
    Applied(Account),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

/// Ledger seam used by the orchestrator and the compensation handler
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Read an account snapshot
    async fn get(&self, account_id: &AccountId) -> Result<Account, LedgerError>;

    /// Atomically decrement `amount` if the account exists and holds at
    /// least `amount`; otherwise `Rejected` with no mutation.
    async fn conditional_debit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError>;

    /// Atomically increment `amount`; `NotFound` if the account is absent.
    async fn credit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError>;

    /// Fence `op`: block it forever unless it has already been applied.
    ///
    /// Waits for an in-flight mutation under the same key to settle, so the
    /// answer is final.
    async fn void(&self, op: OpKey, account_id: &AccountId) -> Result<VoidOutcome, LedgerError>;

    /// Register an account with an opening balance (seeding, tests)
    async fn open_account(
        &self,
        account_id: AccountId,
        name: &str,
        balance: Decimal,
    ) -> Result<Account, LedgerError>;
}
