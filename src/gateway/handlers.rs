use axum::{
    Extension, Json,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use validator::Validate;

use super::state::AppState;
use super::types::{
    AccountResponse, ApiError, ErrorResponse, HealthResponse, TransferBody, TransferResponse,
    TransferStatusResponse,
};
use crate::auth::bearer_token;
use crate::core_types::{AccountId, TransferId};

/// Bearer authentication for private routes
///
/// Resolves the token through the [`AuthGate`](crate::auth::AuthGate) and
/// stores the caller's [`AccountId`] in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;

    let caller = state.auth.authenticate(token).await.map_err(|e| {
        tracing::debug!(error = %e, "bearer authentication failed");
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Transfer funds from the caller's account
///
/// POST /api/v1/transfer
#[utoipa::path(
    post,
    path = "/api/v1/transfer",
    request_body = TransferBody,
    responses(
        (status = 200, description = "Transfer completed", body = TransferResponse),
        (status = 400, description = "Invalid transfer details", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Sender is not the caller", body = ErrorResponse),
        (status = 404, description = "Sender or receiver not found", body = ErrorResponse),
        (status = 409, description = "Insufficient funds or duplicate request", body = ErrorResponse),
        (status = 500, description = "Debit, credit or compensation failure", body = ErrorResponse),
        (status = 503, description = "Credit outcome pending, settled by recovery", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Transfer"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AccountId>,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    let Json(body) = payload?;
    body.validate()?;

    let receipt = state
        .orchestrator
        .transfer(body.into_request(caller))
        .await?;
    Ok(Json(receipt.into()))
}

/// Read the caller's own account
///
/// GET /api/v1/accounts/{id}
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account snapshot", body = AccountResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Account belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AccountId>,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    if caller.as_str() != id {
        return Err(ApiError::forbidden());
    }
    let account = state.orchestrator.ledger().get(&caller).await?;
    Ok(Json(account.into()))
}

/// Journal status of a transfer started by the caller
///
/// GET /api/v1/transfers/{id}
#[utoipa::path(
    get,
    path = "/api/v1/transfers/{id}",
    params(("id" = String, Path, description = "Transfer id (ULID)")),
    responses(
        (status = 200, description = "Transfer record", body = TransferStatusResponse),
        (status = 400, description = "Malformed transfer id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Transfer not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Transfer"
)]
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AccountId>,
    Path(id): Path<String>,
) -> Result<Json<TransferStatusResponse>, ApiError> {
    let transfer_id: TransferId = id
        .parse()
        .map_err(|_| ApiError::validation(format!("Invalid transfer id: {}", id)))?;

    let record = state.orchestrator.status(transfer_id, &caller).await?;
    Ok(Json(record.into()))
}

/// Health check
///
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.to_string(),
    })
}
