use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, TokenError, UserError};
use crate::validation::ValidationErrors;

#[derive(Debug)]
pub enum ApiError {
    Validation(BTreeMap<String, String>),

    BadRequest(String),

    NotFound(String),

    Conflict(String),

    Unauthorized(String),

    Forbidden(String),

    ServiceUnavailable(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "Validation error: {} field(s)", errors.len()),
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::<()>::invalid("Validation failed", errors),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiResponse::error(msg)),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ApiResponse::error(msg)),
            Self::Conflict(msg) => (StatusCode::CONFLICT, ApiResponse::error(msg)),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ApiResponse::error(msg)),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiResponse::error(msg)),
            Self::ServiceUnavailable(msg) => {
                tracing::warn!("Request aborted: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiResponse::error("The request timed out, please retry"),
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("An internal error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        Self::Validation(err.to_map())
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Validation(e) => e.into(),
            UserError::NotFound => Self::NotFound("User not found".to_string()),
            UserError::Conflict(msg) => Self::Conflict(msg),
            UserError::BadRequest(msg) => Self::BadRequest(msg),
            UserError::Cancelled(e) => Self::ServiceUnavailable(e.to_string()),
            UserError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::Unauthorized("Invalid or expired token".to_string()),
            TokenError::NotFound => Self::NotFound("Token not found".to_string()),
            TokenError::Cancelled(e) => Self::ServiceUnavailable(e.to_string()),
            TokenError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(e) => e.into(),
            AuthError::InvalidCredentials => {
                Self::Unauthorized("Invalid email or password".to_string())
            }
            AuthError::Unauthorized(msg) => Self::Unauthorized(msg),
            AuthError::NotFound(msg) => Self::NotFound(msg),
            AuthError::Conflict(msg) => Self::Conflict(msg),
            AuthError::BadRequest(msg) => Self::BadRequest(msg),
            AuthError::Cancelled(e) => Self::ServiceUnavailable(e.to_string()),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self::Unauthorized("Please authenticate".to_string())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("You don't have permission to access this resource".to_string())
    }
}
