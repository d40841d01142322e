//! Caller authentication
//!
//! The transfer core only needs "who is calling": an [`AuthGate`] turns a
//! bearer credential into an [`AccountId`]. Token issuance lives elsewhere.

pub mod jwt;

pub use jwt::JwtAuthGate;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    MissingCredential,

    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[async_trait]
pub trait AuthGate: Send + Sync {
    /// Resolve a bearer token to the authenticated account
    async fn authenticate(&self, token: &str) -> Result<AccountId, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}
