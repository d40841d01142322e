//! Account model
//!
//! Accounts are owned by the [`AccountLedger`](crate::ledger::AccountLedger);
//! this crate never creates them on a user's behalf (registration lives
//! elsewhere) and never deletes them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::AccountId;

/// Account snapshot as returned by ledger operations
///
/// # Invariant
/// `balance >= 0` at every observable point. Only the ledger mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub balance: Decimal,
}

impl Account {
    pub fn new(id: AccountId, name: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            balance,
        }
    }
}
