//! Transfer Core Types

use rust_decimal::Decimal;
use std::fmt;

use super::error::TransferError;
use super::state::TransferState;
use crate::core_types::{AccountId, TransferId};
use crate::money::{Amount, parse_amount};

/// Maximum length of a client idempotency key
pub const MAX_CID_LEN: usize = 64;

/// Transfer request as it reaches the orchestrator
///
/// Ids and amount are still in client form; `caller` has already been
/// resolved by the [`AuthGate`](crate::auth::AuthGate).
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
    /// Authenticated account id
    pub caller: AccountId,
    /// Client-provided idempotency key (optional)
    pub cid: Option<String>,
}

impl TransferRequest {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: impl Into<String>,
        caller: AccountId,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
            caller,
            cid: None,
        }
    }

    /// Attach a client idempotency key
    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    /// Validating step: structural checks only, no ledger access
    pub fn validate(&self, max_scale: u32) -> Result<ValidatedTransfer, TransferError> {
        let from = AccountId::parse(&self.from)
            .ok_or_else(|| TransferError::Validation("fromId is required".into()))?;
        let to = AccountId::parse(&self.to)
            .ok_or_else(|| TransferError::Validation("toId is required".into()))?;

        if from == to {
            return Err(TransferError::Validation(
                "fromId and toId must be different accounts".into(),
            ));
        }

        let amount = parse_amount(&self.amount, max_scale)?;

        let cid = match &self.cid {
            None => None,
            Some(raw) => {
                let cid = raw.trim();
                if cid.is_empty() || cid.len() > MAX_CID_LEN {
                    return Err(TransferError::Validation(format!(
                        "cid must be 1-{} characters",
                        MAX_CID_LEN
                    )));
                }
                Some(cid.to_string())
            }
        };

        Ok(ValidatedTransfer {
            from,
            to,
            amount,
            caller: self.caller.clone(),
            cid,
        })
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub caller: AccountId,
    pub cid: Option<String>,
}

/// Journal record: one per transfer, written before the first mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub transfer_id: TransferId,
    pub cid: Option<String>,
    pub caller: AccountId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub state: TransferState,
    /// Last error message
    pub error: Option<String>,
    pub retry_count: i32,
    /// Post-transfer balances, set on COMPLETED
    pub sender_balance: Option<Decimal>,
    pub receiver_balance: Option<Decimal>,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis)
    pub updated_at: i64,
}

impl TransferRecord {
    /// New record in DEBITING state
    pub fn new(transfer_id: TransferId, transfer: &ValidatedTransfer) -> Self {
        let now = crate::db::now_ms();
        Self {
            transfer_id,
            cid: transfer.cid.clone(),
            caller: transfer.caller.clone(),
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            amount: transfer.amount,
            state: TransferState::Debiting,
            error: None,
            retry_count: 0,
            sender_balance: None,
            receiver_balance: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same logical transfer (idempotent replay check)
    pub fn matches(&self, transfer: &ValidatedTransfer) -> bool {
        self.from == transfer.from && self.to == transfer.to && self.amount == transfer.amount
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} amount={} state={}",
            self.transfer_id, self.from, self.to, self.amount, self.state
        )
    }
}

/// Successful transfer outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: TransferId,
    pub from: AccountId,
    pub from_name: String,
    pub to: AccountId,
    pub to_name: String,
    pub amount: Amount,
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
}

impl TransferReceipt {
    /// e.g. `Transferred $300 from Alice to Bob.`
    pub fn message(&self) -> String {
        format!(
            "Transferred ${} from {} to {}.",
            self.amount, self.from_name, self.to_name
        )
    }
}
