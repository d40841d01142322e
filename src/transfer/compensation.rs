//! Compensation Handler
//!
//! Reverses a debit whose paired credit could not complete. A refund is an
//! unconditional credit keyed `(transfer_id, REFUND)`, so retrying it (here,
//! or later from the recovery worker) never refunds twice.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::account::Account;
use crate::core_types::{AccountId, TransferId};
use crate::ledger::{AccountLedger, OpKey};
use crate::money::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompensationError {
    #[error("Refund to {account_id} unresolved after {attempts} attempt(s): {reason}")]
    Unresolved {
        account_id: AccountId,
        attempts: u32,
        reason: String,
    },
}

pub struct CompensationHandler {
    ledger: Arc<dyn AccountLedger>,
    attempts: u32,
    backoff: Duration,
}

impl CompensationHandler {
    pub fn new(ledger: Arc<dyn AccountLedger>, attempts: u32, backoff: Duration) -> Self {
        Self {
            ledger,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Credit `amount` back to `account_id`.
    ///
    /// Tries up to `attempts` times. On final failure emits an alert-level
    /// event; the caller keeps the journal record in COMPENSATING.
    pub async fn refund(
        &self,
        transfer_id: TransferId,
        account_id: &AccountId,
        amount: Amount,
    ) -> Result<Account, CompensationError> {
        let op = OpKey::refund(transfer_id);
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.ledger.credit(op, account_id, amount).await {
                Ok(account) => {
                    info!(
                        transfer_id = %transfer_id,
                        account_id = %account_id,
                        amount = %amount,
                        attempt,
                        "Sender refunded"
                    );
                    return Ok(account);
                }
                Err(e) => {
                    warn!(
                        transfer_id = %transfer_id,
                        account_id = %account_id,
                        attempt,
                        error = %e,
                        "Refund attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        error!(
            alert = "compensation_failure",
            transfer_id = %transfer_id,
            account_id = %account_id,
            amount = %amount,
            attempts = self.attempts,
            error = %last_error,
            "CRITICAL: refund unresolved, sender debited without matching credit"
        );

        Err(CompensationError::Unresolved {
            account_id: account_id.clone(),
            attempts: self.attempts,
            reason: last_error,
        })
    }
}
