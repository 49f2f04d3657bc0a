//! Domain service for user accounts.
//!
//! Validates input, hashes passwords, applies search and pagination, and maps
//! store outcomes onto [`UserError`]. Every operation takes a
//! [`RequestContext`] so a cancelled request aborts its store calls.

use serde::Deserialize;
use thiserror::Error;

use crate::context::{ContextError, RequestContext};
use crate::entities::users;
use crate::validation::{ROLES, Rule, Validate, ValidationErrors, Validator};

pub type User = users::Model;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

pub const NAME_RULES: &[Rule] = &[Rule::MinLength(3), Rule::MaxLength(100)];
pub const PASSWORD_RULES: &[Rule] = &[
    Rule::MinLength(8),
    Rule::MaxLength(100),
    Rule::PasswordStrength,
];

/// Errors specific to user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Request aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

impl Validate for CreateUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("name", &self.name, NAME_RULES)
            .required("email", &self.email, &[Rule::Email])
            .required("password", &self.password, PASSWORD_RULES)
            .required("role", &self.role, &[Rule::OneOf(ROLES)])
            .finish()
    }
}

/// Partial update. `None` leaves the column unchanged; `Some("")` is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UpdateUser {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password.is_none()
    }
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .optional("name", self.name.as_deref(), NAME_RULES)
            .optional("email", self.email.as_deref(), &[Rule::Email])
            .optional("password", self.password.as_deref(), PASSWORD_RULES)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePasswordOrVerification {
    pub password: Option<String>,
    pub verified_email: Option<bool>,
}

impl Validate for UpdatePasswordOrVerification {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .optional("password", self.password.as_deref(), PASSWORD_RULES)
            .finish()
    }
}

/// `?page=&limit=&search=`. Paging stays text until validation so that
/// `page=abc` is reported against `page` instead of failing extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryUser {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

fn parsed(value: Option<&str>, default: i64) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl QueryUser {
    #[must_use]
    pub fn page(&self) -> i64 {
        parsed(self.page.as_deref(), DEFAULT_PAGE)
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        parsed(self.limit.as_deref(), DEFAULT_LIMIT)
    }

    /// `(page - 1) * limit`; only meaningful once the query validated.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

impl Validate for QueryUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .numeric("page", self.page.as_deref(), &[Rule::Min(1)])
            .numeric(
                "limit",
                self.limit.as_deref(),
                &[Rule::Min(1), Rule::Max(MAX_LIMIT)],
            )
            .optional("search", self.search.as_deref(), &[Rule::MaxLength(100)])
            .finish()
    }
}

/// Identity asserted by Google after the OAuth exchange.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleLogin {
    pub name: String,
    pub email: String,
    pub verified_email: Option<bool>,
}

impl Validate for GoogleLogin {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .required("name", &self.name, &[Rule::MaxLength(100)])
            .required("email", &self.email, &[Rule::Email])
            .present("verified_email", self.verified_email.as_ref())
            .finish()
    }
}

/// One page of users plus the size of the whole matching set.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

/// Domain service trait for users.
#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Newest first, optionally filtered by a substring of name, email or role.
    async fn list(&self, ctx: &RequestContext, query: &QueryUser) -> Result<UserPage, UserError>;

    async fn get_by_id(&self, ctx: &RequestContext, id: i32) -> Result<User, UserError>;

    async fn get_by_email(&self, ctx: &RequestContext, email: &str) -> Result<User, UserError>;

    /// # Errors
    ///
    /// Returns [`UserError::Conflict`] if the email is already registered.
    async fn create(&self, ctx: &RequestContext, input: CreateUser) -> Result<User, UserError>;

    /// Creates a password-less account for a federated identity, or only
    /// refreshes `verified_email` when the email already exists.
    async fn upsert_external_identity(
        &self,
        ctx: &RequestContext,
        input: GoogleLogin,
    ) -> Result<User, UserError>;

    /// # Errors
    ///
    /// Returns [`UserError::BadRequest`] when no field is supplied.
    async fn update(
        &self,
        ctx: &RequestContext,
        input: UpdateUser,
        id: i32,
    ) -> Result<User, UserError>;

    async fn update_password_or_verification(
        &self,
        ctx: &RequestContext,
        input: UpdatePasswordOrVerification,
        id: i32,
    ) -> Result<(), UserError>;

    async fn delete(&self, ctx: &RequestContext, id: i32) -> Result<(), UserError>;
}
