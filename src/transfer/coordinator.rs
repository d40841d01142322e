//! Transfer Orchestrator
//!
//! The only entry point that moves funds between two accounts. Drives the
//! saga `VALIDATING -> AUTHORIZING -> DEBITING -> CREDITING -> COMPLETED`,
//! journaling each persisted step before the ledger call it guards.
//!
//! Failure exits:
//! - before the debit: returned directly, nothing to undo
//! - after the debit: always compensated before the error is surfaced;
//!   a failed refund surfaces `CompensationFailure` and stays journaled
//!   as COMPENSATING for the recovery worker
//!
//! A leg whose outcome is unknown is fenced with [`AccountLedger::void`]
//! before the saga takes the opposite branch: the credit before a refund,
//! the debit before a rejection. A leg that turns out to have landed wins
//! and the saga goes forward instead.
//!
//! Once a leg has moved funds, a failed journal write no longer aborts the
//! saga. The record is left behind and the recovery worker re-drives it
//! through the same keyed legs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::compensation::{CompensationError, CompensationHandler};
use super::error::TransferError;
use super::journal::TransferJournal;
use super::state::TransferState;
use super::types::{TransferReceipt, TransferRecord, TransferRequest, ValidatedTransfer};
use crate::account::Account;
use crate::core_types::{AccountId, TransferId};
use crate::ledger::{AccountLedger, LedgerError, OpKey, VoidOutcome};

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum fractional digits accepted in an amount
    pub max_scale: u32,
    /// Upper bound on the credit step; expiry counts as a credit failure
    pub credit_timeout: Duration,
    pub refund_attempts: u32,
    pub refund_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_scale: 2,
            credit_timeout: Duration::from_secs(5),
            refund_attempts: 3,
            refund_backoff: Duration::from_millis(200),
        }
    }
}

pub struct TransferOrchestrator {
    ledger: Arc<dyn AccountLedger>,
    journal: Arc<dyn TransferJournal>,
    compensation: CompensationHandler,
    config: OrchestratorConfig,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<dyn AccountLedger>,
        journal: Arc<dyn TransferJournal>,
        config: OrchestratorConfig,
    ) -> Self {
        let compensation = CompensationHandler::new(
            ledger.clone(),
            config.refund_attempts,
            config.refund_backoff,
        );
        Self {
            ledger,
            journal,
            compensation,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn AccountLedger> {
        &self.ledger
    }

    pub fn journal(&self) -> &Arc<dyn TransferJournal> {
        &self.journal
    }

    /// Move `amount` from `from` to `to` on behalf of `caller`
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferReceipt, TransferError> {
        // === VALIDATING ===
        let transfer = req.validate(self.config.max_scale)?;

        // === AUTHORIZING ===
        if transfer.caller != transfer.from {
            warn!(
                caller = %transfer.caller,
                from = %transfer.from,
                "Transfer forbidden: caller is not the sender"
            );
            return Err(TransferError::Forbidden);
        }

        // Journal the intent BEFORE any mutation
        let record = TransferRecord::new(TransferId::new(), &transfer);
        if let Some(existing) = self.journal.create(&record).await? {
            return self.replay(existing, &transfer).await;
        }

        info!(
            transfer_id = %record.transfer_id,
            from = %record.from,
            to = %record.to,
            amount = %record.amount,
            "Transfer started"
        );

        // === DEBITING ===
        let sender = match self
            .ledger
            .conditional_debit(OpKey::debit(record.transfer_id), &record.from, record.amount)
            .await
        {
            Ok(account) => account,
            Err(LedgerError::Rejected(_)) => return Err(self.reject(&record).await),
            Err(e) => {
                error!(
                    transfer_id = %record.transfer_id,
                    error = %e,
                    "Debit outcome unknown, left for recovery"
                );
                return Err(TransferError::DebitFailure(e.to_string()));
            }
        };

        if let Err(e) = self
            .advance(
                record.transfer_id,
                TransferState::Debiting,
                TransferState::Crediting,
            )
            .await
        {
            warn!(
                transfer_id = %record.transfer_id,
                error = %e,
                "Failed to journal CREDITING, continuing with credit"
            );
        }

        // === CREDITING ===
        let receiver = self.settle_credit(&record, Some(sender.balance)).await?;

        Ok(TransferReceipt {
            transfer_id: record.transfer_id,
            from: sender.id,
            from_name: sender.name,
            to: receiver.id,
            to_name: receiver.name,
            amount: record.amount,
            sender_balance: sender.balance,
            receiver_balance: receiver.balance,
        })
    }

    /// Look up a transfer started by `caller`
    ///
    /// Records of other callers are reported as not found.
    pub async fn status(
        &self,
        transfer_id: TransferId,
        caller: &AccountId,
    ) -> Result<TransferRecord, TransferError> {
        match self.journal.get(transfer_id).await? {
            Some(record) if &record.caller == caller => Ok(record),
            _ => Err(TransferError::TransferNotFound(transfer_id.to_string())),
        }
    }

    /// Drive a journaled transfer one step toward a terminal state.
    ///
    /// Every ledger call here is idempotent by op key, so re-issuing a leg
    /// whose outcome was lost is safe. Returns the state reached.
    pub async fn resume(&self, record: &TransferRecord) -> Result<TransferState, TransferError> {
        match record.state {
            TransferState::Debiting => {
                let debit = self
                    .ledger
                    .conditional_debit(OpKey::debit(record.transfer_id), &record.from, record.amount)
                    .await;
                match debit {
                    Ok(sender) => {
                        self.advance(
                            record.transfer_id,
                            TransferState::Debiting,
                            TransferState::Crediting,
                        )
                        .await?;
                        let result = self.settle_credit(record, Some(sender.balance)).await;
                        outcome_state(result)
                    }
                    Err(LedgerError::Rejected(_)) | Err(LedgerError::Voided(_)) => match self.reject(record).await {
                        TransferError::DebitFailure(e) => Err(TransferError::DebitFailure(e)),
                        _ => Ok(TransferState::Rejected),
                    },
                    Err(e) => {
                        debug!(transfer_id = %record.transfer_id, error = %e, "Debit still unavailable");
                        Ok(TransferState::Debiting)
                    }
                }
            }
            TransferState::Crediting => outcome_state(self.settle_credit(record, None).await),
            TransferState::Compensating => {
                match self
                    .compensation
                    .refund(record.transfer_id, &record.from, record.amount)
                    .await
                {
                    Ok(_) => {
                        self.advance(
                            record.transfer_id,
                            TransferState::Compensating,
                            TransferState::Compensated,
                        )
                        .await?;
                        Ok(TransferState::Compensated)
                    }
                    Err(_) => Ok(TransferState::Compensating),
                }
            }
            terminal => Ok(terminal),
        }
    }

    /// Idempotent replay of a `(caller, cid)` already journaled
    async fn replay(
        &self,
        existing: TransferRecord,
        transfer: &ValidatedTransfer,
    ) -> Result<TransferReceipt, TransferError> {
        if !existing.matches(transfer) {
            return Err(TransferError::Validation(
                "cid was already used with different transfer details".into(),
            ));
        }

        if existing.state != TransferState::Completed {
            debug!(
                transfer_id = %existing.transfer_id,
                state = %existing.state,
                "Duplicate cid for unfinished transfer"
            );
            return Err(TransferError::DuplicateRequest);
        }

        let sender = self.ledger.get(&existing.from).await.ok();
        let receiver = self.ledger.get(&existing.to).await.ok();

        let sender_balance = existing
            .sender_balance
            .or(sender.as_ref().map(|a| a.balance))
            .unwrap_or_default();
        let receiver_balance = existing
            .receiver_balance
            .or(receiver.as_ref().map(|a| a.balance))
            .unwrap_or_default();

        info!(transfer_id = %existing.transfer_id, "Replayed completed transfer");

        Ok(TransferReceipt {
            transfer_id: existing.transfer_id,
            from_name: sender.map_or_else(|| existing.from.to_string(), |a| a.name),
            to_name: receiver.map_or_else(|| existing.to.to_string(), |a| a.name),
            from: existing.from,
            to: existing.to,
            amount: existing.amount,
            sender_balance,
            receiver_balance,
        })
    }

    /// Debit was rejected: fence the debit leg, then tell a missing sender
    /// from an underfunded one.
    ///
    /// Once fenced, the rejection is final even if journaling it fails.
    async fn reject(&self, record: &TransferRecord) -> TransferError {
        match self
            .ledger
            .void(OpKey::debit(record.transfer_id), &record.from)
            .await
        {
            Ok(VoidOutcome::Voided) => {}
            Ok(VoidOutcome::Applied(_)) => {
                warn!(
                    transfer_id = %record.transfer_id,
                    "Debit landed after rejection, left for recovery"
                );
                return TransferError::DebitFailure("debit applied by another attempt".into());
            }
            Err(e) => {
                error!(
                    transfer_id = %record.transfer_id,
                    error = %e,
                    "Could not fence rejected debit, left for recovery"
                );
                return TransferError::DebitFailure(e.to_string());
            }
        }

        let err = match self.ledger.get(&record.from).await {
            Ok(_) => TransferError::InsufficientFunds,
            Err(LedgerError::NotFound(_)) => TransferError::SenderNotFound(record.from.clone()),
            Err(e) => return TransferError::DebitFailure(e.to_string()),
        };

        if let Err(e) = self
            .journal
            .update_state_with_error(
                record.transfer_id,
                TransferState::Debiting,
                TransferState::Rejected,
                &err.to_string(),
            )
            .await
        {
            error!(transfer_id = %record.transfer_id, error = %e, "Failed to journal rejection");
        }

        info!(
            transfer_id = %record.transfer_id,
            reason = err.category(),
            "Transfer rejected, no funds moved"
        );
        err
    }

    /// Credit the receiver; compensate the sender if that fails.
    ///
    /// Funds are IN-FLIGHT on entry (record is CREDITING, or DEBITING when
    /// that journal write failed).
    async fn settle_credit(
        &self,
        record: &TransferRecord,
        sender_balance: Option<rust_decimal::Decimal>,
    ) -> Result<Account, TransferError> {
        let credit = tokio::time::timeout(
            self.config.credit_timeout,
            self.ledger
                .credit(OpKey::credit(record.transfer_id), &record.to, record.amount),
        )
        .await;

        let cause = match credit {
            Ok(Ok(receiver)) => return Ok(self.finish(record, sender_balance, receiver).await),
            Ok(Err(LedgerError::NotFound(_))) => TransferError::ReceiverNotFound(record.to.clone()),
            Ok(Err(e)) => TransferError::CreditFailure(e.to_string()),
            Err(_) => TransferError::CreditFailure(format!(
                "credit timed out after {}ms",
                self.config.credit_timeout.as_millis()
            )),
        };

        // A credit that timed out may still land. Fence it before refunding.
        match self
            .ledger
            .void(OpKey::credit(record.transfer_id), &record.to)
            .await
        {
            Ok(VoidOutcome::Voided) => Err(self.compensate(record, cause).await),
            Ok(VoidOutcome::Applied(receiver)) => {
                info!(
                    transfer_id = %record.transfer_id,
                    error = %cause,
                    "Credit landed despite failure, completing instead of refunding"
                );
                Ok(self.finish(record, sender_balance, receiver).await)
            }
            Err(e) => {
                error!(
                    transfer_id = %record.transfer_id,
                    cause = %cause,
                    error = %e,
                    "Could not fence credit, left for recovery"
                );
                Err(TransferError::Pending(record.transfer_id))
            }
        }
    }

    /// COMPLETED: the credit landed, so the receipt stands even when the
    /// journal write fails. Recovery re-drives the keyed legs and completes
    /// the record.
    async fn finish(
        &self,
        record: &TransferRecord,
        sender_balance: Option<rust_decimal::Decimal>,
        receiver: Account,
    ) -> Account {
        match self
            .journal
            .complete(record.transfer_id, sender_balance, receiver.balance)
            .await
        {
            Ok(true) => info!(
                transfer_id = %record.transfer_id,
                from = %record.from,
                to = %record.to,
                amount = %record.amount,
                "Transfer completed"
            ),
            Ok(false) => warn!(
                transfer_id = %record.transfer_id,
                "Record was not CREDITING at completion, left for recovery"
            ),
            Err(e) => error!(
                transfer_id = %record.transfer_id,
                error = %e,
                "Transfer completed but failed to journal it, left for recovery"
            ),
        }
        receiver
    }

    /// COMPENSATING: refund the sender, then surface `cause`
    async fn compensate(&self, record: &TransferRecord, cause: TransferError) -> TransferError {
        warn!(
            transfer_id = %record.transfer_id,
            error = %cause,
            "Credit failed, compensating sender"
        );

        // The refund is attempted even if journaling fails: it is keyed and
        // cannot be applied twice.
        match self
            .journal
            .update_state_with_error(
                record.transfer_id,
                TransferState::Crediting,
                TransferState::Compensating,
                &cause.to_string(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(transfer_id = %record.transfer_id, "Record was not CREDITING"),
            Err(e) => error!(transfer_id = %record.transfer_id, error = %e, "Failed to journal compensation"),
        }

        match self
            .compensation
            .refund(record.transfer_id, &record.from, record.amount)
            .await
        {
            Ok(_) => {
                if let Err(e) = self
                    .journal
                    .update_state_if(
                        record.transfer_id,
                        TransferState::Compensating,
                        TransferState::Compensated,
                    )
                    .await
                {
                    error!(transfer_id = %record.transfer_id, error = %e, "Failed to journal refund");
                }
                cause
            }
            Err(CompensationError::Unresolved {
                account_id, reason, ..
            }) => TransferError::CompensationFailure { account_id, reason },
        }
    }

    async fn advance(
        &self,
        transfer_id: TransferId,
        expected: TransferState,
        new: TransferState,
    ) -> Result<(), TransferError> {
        if self.journal.update_state_if(transfer_id, expected, new).await? {
            return Ok(());
        }

        let current = self.journal.get(transfer_id).await?;
        error!(
            transfer_id = %transfer_id,
            expected = %expected,
            current = ?current.map(|r| r.state),
            "CAS failed: transfer moved by another actor"
        );
        Err(TransferError::Journal(format!(
            "{} is no longer {}",
            transfer_id, expected
        )))
    }
}

/// Journal state reached after a credit attempt
fn outcome_state(result: Result<Account, TransferError>) -> Result<TransferState, TransferError> {
    match result {
        Ok(_) => Ok(TransferState::Completed),
        Err(TransferError::ReceiverNotFound(_)) | Err(TransferError::CreditFailure(_)) => {
            Ok(TransferState::Compensated)
        }
        Err(TransferError::CompensationFailure { .. }) => Ok(TransferState::Compensating),
        Err(TransferError::Pending(_)) => Ok(TransferState::Crediting),
        Err(e) => Err(e),
    }
}
