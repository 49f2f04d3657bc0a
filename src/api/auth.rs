use axum::{
    Extension,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::extract::{Json, Query};
use super::{
    ApiError, ApiResponse, AppState, AuthResponse, IssuedTokenResponse, MessageResponse, UserDto,
};
use crate::services::auth_service::{
    ForgotPassword, GoogleIdToken, Login, RefreshToken, Register, ResetPassword, TokenQuery,
};
use crate::services::{AuthSession, AuthTokens, IssuedToken, UserError};

/// Caller identity resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub role: String,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Admins may act on anyone; everyone else only on themselves.
    pub fn require_self_or_admin(&self, id: i32) -> Result<(), ApiError> {
        if self.is_admin() || self.id == id {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Requires `Authorization: Bearer <access token>` and that the user still exists.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers).ok_or_else(ApiError::unauthenticated)?;

    let claims = state
        .token_service
        .verify_access(token)
        .map_err(|_| ApiError::unauthenticated())?;

    let ctx = state.request_context();
    let user = match state.user_service.get_by_id(&ctx, claims.sub).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(ApiError::unauthenticated()),
        Err(e) => return Err(e.into()),
    };

    tracing::Span::current().record("user_id", user.id);
    request.extensions_mut().insert(AuthUser {
        id: user.id,
        role: user.role,
    });

    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

fn session_response(session: AuthSession) -> Json<ApiResponse<AuthResponse>> {
    Json(ApiResponse::success(AuthResponse {
        user: UserDto::from(session.user),
        tokens: session.tokens,
    }))
}

fn issued_response(message: &str, issued: IssuedToken) -> Json<ApiResponse<IssuedTokenResponse>> {
    Json(ApiResponse::success(IssuedTokenResponse {
        message: message.to_string(),
        token: issued.token,
        expires: issued.expires.to_rfc3339(),
    }))
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Register>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    let session = state
        .auth_service
        .register(&state.request_context(), payload)
        .await?;
    Ok((StatusCode::CREATED, session_response(session)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Login>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let session = state
        .auth_service
        .login(&state.request_context(), payload)
        .await?;
    Ok(session_response(session))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshToken>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_service
        .logout(&state.request_context(), payload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/refresh-tokens
pub async fn refresh_tokens(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshToken>,
) -> Result<Json<ApiResponse<AuthTokens>>, ApiError> {
    let tokens = state
        .auth_service
        .refresh(&state.request_context(), payload)
        .await?;
    Ok(Json(ApiResponse::success(tokens)))
}

/// POST /auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPassword>,
) -> Result<Json<ApiResponse<IssuedTokenResponse>>, ApiError> {
    let issued = state
        .auth_service
        .forgot_password(&state.request_context(), payload)
        .await?;
    Ok(issued_response("Reset password token issued", issued))
}

/// POST /auth/reset-password?token=
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    Json(payload): Json<ResetPassword>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service
        .reset_password(&state.request_context(), query, payload)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password has been reset",
    ))))
}

/// POST /auth/send-verification-email
pub async fn send_verification_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<IssuedTokenResponse>>, ApiError> {
    let issued = state
        .auth_service
        .send_verification(&state.request_context(), auth.id)
        .await?;
    Ok(issued_response("Verification token issued", issued))
}

/// POST /auth/verify-email?token=
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth_service
        .verify_email(&state.request_context(), query)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Email has been verified",
    ))))
}

/// POST /auth/google
/// Exchanges a Google ID token for our own access/refresh pair.
pub async fn google_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GoogleIdToken>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let session = state
        .auth_service
        .google_login(&state.request_context(), payload)
        .await?;
    Ok(session_response(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }

    #[test]
    fn self_or_admin() {
        let user = AuthUser {
            id: 3,
            role: "user".to_string(),
        };
        assert!(user.require_self_or_admin(3).is_ok());
        assert!(user.require_self_or_admin(4).is_err());
        assert!(user.require_admin().is_err());

        let admin = AuthUser {
            id: 1,
            role: "admin".to_string(),
        };
        assert!(admin.require_self_or_admin(4).is_ok());
        assert!(admin.require_admin().is_ok());
    }
}
