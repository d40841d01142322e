//! Transfer Error Types
//!
//! Every failure a caller can observe from
//! [`TransferOrchestrator::transfer`](super::TransferOrchestrator::transfer).
//! Variants before the debit guarantee no mutation happened; variants after
//! it say whether the sender's debit was undone.

use thiserror::Error;

use super::journal::JournalError;
use crate::core_types::{AccountId, TransferId};
use crate::money::MoneyError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Before any mutation ===
    #[error("Invalid transfer details: {0}")]
    Validation(String),

    #[error("Forbidden. You can only transfer funds from your own account.")]
    Forbidden,

    #[error("Sender account not found: {0}")]
    SenderNotFound(AccountId),

    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("Duplicate request (cid already in progress)")]
    DuplicateRequest,

    /// Debit outcome unknown; the recovery worker settles it
    #[error("An error occurred while attempting to debit the sender: {0}")]
    DebitFailure(String),

    // === After the debit, sender refunded ===
    #[error("Receiver account not found: {0}. Sender was refunded.")]
    ReceiverNotFound(AccountId),

    #[error("Receiver credit failed: {0}. Sender was refunded.")]
    CreditFailure(String),

    // === After the debit, sender NOT refunded ===
    /// Fund-safety violation. The refund stays pending in the journal.
    #[error("Refund of {account_id} failed after credit failure: {reason}")]
    CompensationFailure { account_id: AccountId, reason: String },

    // === After the debit, outcome not yet settled ===
    /// Credit outcome unknown and the credit leg could not be fenced.
    /// The recovery worker either completes or refunds it.
    #[error("Transfer {0} is pending: it will be completed or refunded shortly")]
    Pending(TransferId),

    // === System ===
    #[error("Transfer journal error: {0}")]
    Journal(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),
}

impl TransferError {
    /// Status category for API responses
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "ValidationError",
            TransferError::Forbidden => "Forbidden",
            TransferError::SenderNotFound(_) => "SenderNotFound",
            TransferError::InsufficientFunds => "InsufficientFunds",
            TransferError::DuplicateRequest => "DuplicateRequest",
            TransferError::DebitFailure(_) => "DebitFailure",
            TransferError::ReceiverNotFound(_) => "ReceiverNotFound",
            TransferError::CreditFailure(_) => "CreditFailure",
            TransferError::CompensationFailure { .. } => "CompensationFailure",
            TransferError::Pending(_) => "TransferPending",
            TransferError::Journal(_) => "JournalError",
            TransferError::TransferNotFound(_) => "TransferNotFound",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::Validation(_) => 400,
            TransferError::Forbidden => 403,
            TransferError::SenderNotFound(_)
            | TransferError::ReceiverNotFound(_)
            | TransferError::TransferNotFound(_) => 404,
            TransferError::InsufficientFunds | TransferError::DuplicateRequest => 409,
            TransferError::DebitFailure(_)
            | TransferError::CreditFailure(_)
            | TransferError::CompensationFailure { .. }
            | TransferError::Journal(_) => 500,
            TransferError::Pending(_) => 503,
        }
    }

    /// The sender was debited and could not be refunded
    pub fn is_fund_safety_violation(&self) -> bool {
        matches!(self, TransferError::CompensationFailure { .. })
    }
}

impl From<JournalError> for TransferError {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::NotFound(id) => TransferError::TransferNotFound(id.to_string()),
            other => TransferError::Journal(other.to_string()),
        }
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        TransferError::Validation(e.to_string())
    }
}
