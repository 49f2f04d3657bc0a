//! Domain service for authentication.
//!
//! Handles registration, credential login, token refresh and logout, and the
//! password-reset and email-verification flows. Account state lives in the
//! user service; credentials come from the token service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextError, RequestContext};
use crate::services::google::GoogleError;
use crate::services::token_service::{AuthTokens, IssuedToken, TokenError};
use crate::services::user_service::{NAME_RULES, PASSWORD_RULES, User, UserError};
use crate::validation::{Rule, Validate, ValidationErrors, Validator};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Request aborted: {0}")]
    Cancelled(ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserError> for AuthError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Validation(e) => Self::Validation(e),
            UserError::NotFound => Self::NotFound("User not found".to_string()),
            UserError::Conflict(msg) => Self::Conflict(msg),
            UserError::BadRequest(msg) => Self::BadRequest(msg),
            UserError::Cancelled(e) => Self::Cancelled(e),
            UserError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::Unauthorized("Invalid or expired token".to_string()),
            TokenError::NotFound => Self::NotFound("Token not found".to_string()),
            TokenError::Cancelled(e) => Self::Cancelled(e),
            TokenError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<GoogleError> for AuthError {
    fn from(err: GoogleError) -> Self {
        match err {
            GoogleError::NotConfigured | GoogleError::InvalidToken => {
                Self::Unauthorized(err.to_string())
            }
            GoogleError::Cancelled(e) => Self::Cancelled(e),
            GoogleError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Register {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validate for Register {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("name", &self.name, NAME_RULES)
            .required("email", &self.email, &[Rule::Email])
            .required("password", &self.password, PASSWORD_RULES)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Login {
    pub email: String,
    pub password: String,
}

impl Validate for Login {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("email", &self.email, &[Rule::Email])
            .required(
                "password",
                &self.password,
                &[Rule::MinLength(8), Rule::MaxLength(100)],
            )
            .finish()
    }
}

/// Body of logout and refresh requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshToken {
    pub refresh_token: String,
}

impl Validate for RefreshToken {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("refresh_token", &self.refresh_token, &[])
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPassword {
    pub email: String,
}

impl Validate for ForgotPassword {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("email", &self.email, &[Rule::Email])
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResetPassword {
    pub password: String,
}

impl Validate for ResetPassword {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("password", &self.password, PASSWORD_RULES)
            .finish()
    }
}

/// `?token=` of the reset-password and verify-email links.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenQuery {
    pub token: String,
}

impl Validate for TokenQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("token", &self.token, &[])
            .finish()
    }
}

/// ID token obtained by the client from Google Sign-In.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleIdToken {
    pub id_token: String,
}

impl Validate for GoogleIdToken {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("id_token", &self.id_token, &[])
            .finish()
    }
}

/// A signed-in user and their fresh credentials.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    #[serde(skip)]
    pub user: User,
    pub tokens: AuthTokens,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a `user`-role account and signs it in.
    async fn register(&self, ctx: &RequestContext, input: Register)
    -> Result<AuthSession, AuthError>;

    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email, an
    /// account without a password, or a wrong password.
    async fn login(&self, ctx: &RequestContext, input: Login) -> Result<AuthSession, AuthError>;

    async fn logout(&self, ctx: &RequestContext, input: RefreshToken) -> Result<(), AuthError>;

    /// Exchanges a refresh token for a new pair; the old refresh token is revoked.
    async fn refresh(
        &self,
        ctx: &RequestContext,
        input: RefreshToken,
    ) -> Result<AuthTokens, AuthError>;

    /// Issues a reset token for an existing email. Delivery is up to the caller.
    async fn forgot_password(
        &self,
        ctx: &RequestContext,
        input: ForgotPassword,
    ) -> Result<IssuedToken, AuthError>;

    async fn reset_password(
        &self,
        ctx: &RequestContext,
        query: TokenQuery,
        input: ResetPassword,
    ) -> Result<(), AuthError>;

    async fn send_verification(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, AuthError>;

    async fn verify_email(&self, ctx: &RequestContext, query: TokenQuery)
    -> Result<(), AuthError>;

    /// Signs in the owner of a Google ID token, creating the account on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] unless the token verifies and
    /// Google vouches for the email.
    async fn google_login(
        &self,
        ctx: &RequestContext,
        input: GoogleIdToken,
    ) -> Result<AuthSession, AuthError>;
}
