use axum::{Extension, extract::State, http::StatusCode};
use std::sync::Arc;

use super::auth::AuthUser;
use super::extract::{Json, Path, Query};
use super::{ApiError, ApiResponse, AppState, UserDto, UserListResponse};
use crate::services::user_service::{CreateUser, QueryUser, UpdateUser};

fn total_pages(total: u64, limit: i64) -> u64 {
    let limit = limit.unsigned_abs().max(1);
    total.div_ceil(limit)
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<QueryUser>,
) -> Result<Json<ApiResponse<UserListResponse>>, ApiError> {
    auth.require_admin()?;

    let page = state
        .user_service
        .list(&state.request_context(), &query)
        .await?;

    Ok(Json(ApiResponse::success(UserListResponse {
        users: page.users.into_iter().map(UserDto::from).collect(),
        page: query.page(),
        limit: query.limit(),
        total: page.total,
        total_pages: total_pages(page.total, query.limit()),
    })))
}

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<ApiResponse<UserDto>>), ApiError> {
    auth.require_admin()?;

    let user = state
        .user_service
        .create(&state.request_context(), payload)
        .await?;
    tracing::info!(user_id = user.id, created_by = auth.id, "User created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(user.into()))))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require_self_or_admin(id)?;

    let user = state
        .user_service
        .get_by_id(&state.request_context(), id)
        .await?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// PATCH /users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUser>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    auth.require_self_or_admin(id)?;

    let user = state
        .user_service
        .update(&state.request_context(), payload, id)
        .await?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// DELETE /users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin()?;

    state
        .user_service
        .delete(&state.request_context(), id)
        .await?;
    tracing::info!(user_id = id, deleted_by = auth.id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}
