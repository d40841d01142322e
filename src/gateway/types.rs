//! Request / response DTOs and the HTTP error type
//!
//! Wire format is camelCase; decimals are serialized as strings.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::account::Account;
use crate::auth::AuthError;
use crate::core_types::AccountId;
use crate::ledger::LedgerError;
use crate::money::RawAmount;
use crate::transfer::{TransferError, TransferReceipt, TransferRecord, TransferRequest};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /api/v1/transfer`
///
/// Missing ids and amounts deserialize to empty values so they surface as
/// `ValidationError` rather than a body rejection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[serde(default)]
    #[validate(length(max = 128))]
    #[schema(example = "alice")]
    pub from_id: String,

    #[serde(default)]
    #[validate(length(max = 128))]
    #[schema(example = "bob")]
    pub to_id: String,

    /// Decimal string or JSON number
    #[serde(default)]
    #[schema(value_type = String, example = "300.00")]
    pub amount: RawAmount,

    /// Client idempotency key, unique per caller
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "7f1c2a")]
    pub cid: Option<String>,
}

impl TransferBody {
    pub fn into_request(self, caller: AccountId) -> TransferRequest {
        let req = TransferRequest::new(self.from_id, self.to_id, self.amount.as_str(), caller);
        match self.cid {
            Some(cid) => req.with_cid(cid),
            None => req,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    #[schema(example = "Transferred $300 from Alice to Bob.")]
    pub message: String,
    #[schema(value_type = String, example = "700.00")]
    pub sender_balance: Decimal,
    #[schema(value_type = String, example = "800.00")]
    pub receiver_balance: Decimal,
    #[schema(example = "01HZY3M9K4V8Q2T6W0X5J7R1NB")]
    pub transfer_id: String,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            message: receipt.message(),
            sender_balance: receipt.sender_balance,
            receiver_balance: receipt.receiver_balance,
            transfer_id: receipt.transfer_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    #[schema(value_type = String, example = "1000.00")]
    pub balance: Decimal,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.as_str().to_string(),
            name: account.name,
            balance: account.balance,
        }
    }
}

/// Journal summary of one transfer
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusResponse {
    pub transfer_id: String,
    #[schema(example = "COMPLETED")]
    pub state: String,
    pub from_id: String,
    pub to_id: String,
    #[schema(value_type = String, example = "300.00")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<TransferRecord> for TransferStatusResponse {
    fn from(record: TransferRecord) -> Self {
        Self {
            transfer_id: record.transfer_id.to_string(),
            state: record.state.as_str().to_string(),
            from_id: record.from.as_str().to_string(),
            to_id: record.to.as_str().to_string(),
            amount: record.amount.value(),
            cid: record.cid,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "a1b2c3d")]
    pub version: String,
}

/// Body of every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[schema(example = "InsufficientFunds")]
    pub status_category: String,
    #[schema(example = "Insufficient funds")]
    pub message: String,
}

// ============================================================================
// ApiError
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub category: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "ValidationError", message)
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "Forbidden",
            "Cannot access other accounts",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status_category: self.category.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.category(), err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(errors.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "AccountNotFound",
                format!("Account not found: {}", id),
            ),
            other => Self::internal(other.to_string()),
        }
    }
}
