//! In-memory ledger
//!
//! Accounts live in a `DashMap`; `get_mut` holds the entry's shard lock for
//! the whole check-and-mutate, which gives per-account atomicity without a
//! global lock. Op keys live in a second map consulted while the account
//! lock is held, so the idempotency check, the fence check and the mutation
//! are one step.
//!
//! Lock order is always account, then op key. [`MemoryLedger::void`] only
//! ever holds the op-key entry.
//!
//! Dev and test backend: balances are lost on restart. Op keys of settled
//! transfers are dropped through [`MemoryLedger::forget_transfers`].

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tracing::debug;

use super::{AccountLedger, Leg, LedgerError, OpKey, VoidOutcome};
use crate::account::Account;
use crate::core_types::{AccountId, TransferId};
use crate::money::Amount;

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpMark {
    Applied(AccountId),
    Void,
}

#[derive(Default)]
pub struct MemoryLedger {
    accounts: DashMap<AccountId, Account>,
    ops: DashMap<OpKey, OpMark>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances (conservation checks)
    pub fn total_balance(&self) -> Decimal {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Number of op keys held (applied or voided)
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Drop the op keys of transfers that reached a terminal state
    pub fn forget_transfers(&self, transfer_ids: &[TransferId]) {
        for &transfer_id in transfer_ids {
            for leg in [Leg::Debit, Leg::Credit, Leg::Refund] {
                self.ops.remove(&OpKey::new(transfer_id, leg));
            }
        }
    }

    /// Apply `mutate` to the account under `op`, at most once.
    ///
    /// `missing` is the error for an absent account.
    fn apply<F>(
        &self,
        op: OpKey,
        account_id: &AccountId,
        missing: LedgerError,
        mutate: F,
    ) -> Result<Account, LedgerError>
    where
        F: FnOnce(&Account) -> Result<Decimal, LedgerError>,
    {
        let Some(mut account) = self.accounts.get_mut(account_id) else {
            return Err(missing);
        };

        match self.ops.entry(op) {
            Entry::Occupied(mark) => match mark.get() {
                OpMark::Applied(_) => {
                    debug!(op = %op, account_id = %account_id, "Op already applied");
                    Ok(account.clone())
                }
                OpMark::Void => Err(LedgerError::Voided(op)),
            },
            Entry::Vacant(slot) => {
                account.balance = mutate(account.value())?;
                slot.insert(OpMark::Applied(account_id.clone()));
                Ok(account.clone())
            }
        }
    }
}

#[async_trait]
impl AccountLedger for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.accounts
            .get(account_id)
            .map(|a| a.clone())
            .ok_or_else(|| LedgerError::NotFound(account_id.clone()))
    }

    async fn conditional_debit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        let rejected = LedgerError::Rejected(account_id.clone());
        self.apply(op, account_id, rejected.clone(), |account| {
            if account.balance < amount.value() {
                return Err(rejected);
            }
            account
                .balance
                .checked_sub(amount.value())
                .ok_or_else(|| LedgerError::Rejected(account_id.clone()))
        })
    }

    async fn credit(
        &self,
        op: OpKey,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, LedgerError> {
        self.apply(
            op,
            account_id,
            LedgerError::NotFound(account_id.clone()),
            |account| {
                account
                    .balance
                    .checked_add(amount.value())
                    .ok_or_else(|| LedgerError::Overflow(account_id.clone()))
            },
        )
    }

    async fn void(&self, op: OpKey, account_id: &AccountId) -> Result<VoidOutcome, LedgerError> {
        let applied_to = match self.ops.entry(op) {
            Entry::Occupied(mark) => match mark.get() {
                OpMark::Void => return Ok(VoidOutcome::Voided),
                OpMark::Applied(id) => id.clone(),
            },
            Entry::Vacant(slot) => {
                slot.insert(OpMark::Void);
                debug!(op = %op, account_id = %account_id, "Op voided");
                return Ok(VoidOutcome::Voided);
            }
        };

        // Op-key entry released before touching accounts
        self.get(&applied_to).await.map(VoidOutcome::Applied)
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

        match self.accounts.entry(account_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(account_id)),
            Entry::Vacant(v) => {
                let account = Account::new(account_id, name, balance);
                v.insert(account.clone());
                Ok(account)
            }
        }
    }
}
