//! Domain service for issued credentials.
//!
//! Access tokens are stateless JWTs. Refresh, reset-password and
//! verify-email tokens are JWTs as well but are also persisted, so they can be
//! revoked and are only honoured while their row exists and has not expired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextError, RequestContext};
use crate::services::user_service::User;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::ResetPassword => "reset_password",
            Self::VerifyEmail => "verify_email",
        }
    }
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i32,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,

    #[error("Token not found")]
    NotFound,

    #[error("Request aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for TokenError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthTokens {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Issues an access/refresh pair and persists the refresh token.
    async fn generate_auth_tokens(
        &self,
        ctx: &RequestContext,
        user: &User,
    ) -> Result<AuthTokens, TokenError>;

    /// Stateless check of an access token.
    fn verify_access(&self, token: &str) -> Result<Claims, TokenError>;

    /// Checks signature, type and the persisted row; returns the user id.
    async fn verify_token(
        &self,
        ctx: &RequestContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<i32, TokenError>;

    /// Replaces any outstanding reset token for the user.
    async fn generate_reset_password_token(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, TokenError>;

    /// Replaces any outstanding verification token for the user.
    async fn generate_verify_email_token(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, TokenError>;

    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`] if no such token is persisted.
    async fn revoke(
        &self,
        ctx: &RequestContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<(), TokenError>;

    /// Drops every persisted token of `kind` belonging to the user.
    async fn revoke_all(
        &self,
        ctx: &RequestContext,
        user_id: i32,
        kind: TokenKind,
    ) -> Result<(), TokenError>;
}
