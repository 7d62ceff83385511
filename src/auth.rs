//! Bearer token validation for WebSocket admission and the admin API

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Secret used when CHAT_TOKEN_SECRET is unset. Only suitable for local development.
const DEV_SECRET: &str = "civichub-dev-secret";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Resolves a bearer token to the user it was issued for
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate_token(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing and verifying connection tokens
    pub token_secret: String,
    /// Bearer token for the admin API (None = admin API disabled)
    pub admin_token: Option<String>,
}

impl AuthConfig {
    /// Load auth config from CHAT_TOKEN_SECRET and CHAT_ADMIN_TOKEN
    pub fn from_env() -> Self {
        let token_secret = std::env::var("CHAT_TOKEN_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let admin_token = std::env::var("CHAT_ADMIN_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let token_secret = match token_secret {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "CHAT_TOKEN_SECRET not set - using the development secret, tokens are forgeable!"
                );
                DEV_SECRET.to_string()
            }
        };

        if admin_token.is_none() {
            tracing::warn!("CHAT_ADMIN_TOKEN not set - admin API disabled");
        }

        Self {
            token_secret,
            admin_token,
        }
    }

    /// Check the `Authorization: Bearer ...` header against the admin token.
    /// Always false while the admin API is disabled.
    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.admin_token else {
            return false;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| constant_time_eq(expected.as_bytes(), token.trim().as_bytes()))
            .unwrap_or(false)
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// JWT claims carried by connection tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: UserId,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// HS256 JWT validation for connection tokens
#[derive(Clone)]
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::default();
        // Expiry is exact, no grace period
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.token_secret.as_bytes())
    }

    /// Issue a token for `user_id` valid for `ttl`
    pub fn issue(&self, user_id: &str, ttl: chrono::Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp().max(0) as u64,
            iat: now.timestamp().max(0) as u64,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Verify and decode a token
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            }
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::Malformed);
        }
        Ok(data.claims)
    }
}

#[async_trait]
impl TokenValidator for JwtAuth {
    async fn validate_token(&self, token: &str) -> Result<UserId, AuthError> {
        self.verify(token).map(|claims| claims.sub)
    }
}
