//! Store contracts used by the services, and their `SeaORM` implementations.

use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::entities::{tokens, users};

pub mod token;
pub mod user;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => Self::UniqueViolation(msg),
            _ if matches!(err, DbErr::RecordNotFound(_)) => Self::NotFound,
            _ => Self::Database(err),
        }
    }
}

/// Predicate over the `users` table. Unset fields do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub id: Option<i32>,
    pub email: Option<String>,
    /// Case-sensitive substring matched against name, email or role.
    pub search: Option<String>,
}

impl UserFilter {
    #[must_use]
    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn search(search: impl Into<String>) -> Self {
        let search = search.into();
        Self {
            search: (!search.is_empty()).then_some(search),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub role: String,
    pub verified_email: bool,
}

/// Columns to overwrite in a partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub verified_email: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewToken {
    pub user_id: i32,
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Newest first, ties broken by id.
    async fn find_many(
        &self,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<users::Model>, StoreError>;

    async fn count(&self, filter: &UserFilter) -> Result<u64, StoreError>;

    /// Fails with [`StoreError::NotFound`] when nothing matches.
    async fn find_one(&self, filter: &UserFilter) -> Result<users::Model, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the email is taken.
    async fn create(&self, user: NewUser) -> Result<users::Model, StoreError>;

    /// Returns the number of rows affected.
    async fn update_partial(&self, id: i32, patch: UserPatch) -> Result<u64, StoreError>;

    /// Returns the number of rows affected.
    async fn delete(&self, id: i32) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: NewToken) -> Result<tokens::Model, StoreError>;

    /// Matches on token string and type, and only if `expires_at` is after `now`.
    async fn find_valid(
        &self,
        token: &str,
        token_type: &str,
        now: DateTime<Utc>,
    ) -> Result<tokens::Model, StoreError>;

    async fn delete_by_token(&self, token: &str, token_type: &str) -> Result<u64, StoreError>;

    async fn delete_for_user(&self, user_id: i32, token_type: &str) -> Result<u64, StoreError>;
}
