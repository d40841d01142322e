//! HS256 bearer tokens

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthGate};
use crate::core_types::AccountId;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (account id)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

pub struct JwtAuthGate {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthGate {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[async_trait]
impl AuthGate for JwtAuthGate {
    async fn authenticate(&self, token: &str) -> Result<AccountId, AuthError> {
        let claims = self.verify_token(token)?;
        AccountId::parse(&claims.sub)
            .ok_or_else(|| AuthError::InvalidToken("empty subject".into()))
    }
}

/// Sign a token for `sub` (tests only; issuance is external)
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, sub: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
