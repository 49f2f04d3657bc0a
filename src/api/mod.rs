use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::context::RequestContext;
use crate::db::Store;
use crate::services::{
    Argon2Hasher, AuthService, DefaultAuthService, DefaultUserService, GoogleIdTokenVerifier,
    JwtKeys, JwtTokenService, PasswordHasher, TokenService, UserService,
};

pub mod auth;
mod error;
mod extract;
mod observability;
mod types;
mod users;

pub use auth::AuthUser;
pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub store: Store,

    pub user_service: Arc<dyn UserService>,

    pub token_service: Arc<dyn TokenService>,

    pub auth_service: Arc<dyn AuthService>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires the services over an already migrated store.
    pub fn new(
        config: Config,
        store: Store,
        hasher: Arc<dyn PasswordHasher>,
        prometheus_handle: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let user_service: Arc<dyn UserService> = Arc::new(DefaultUserService::new(
            Arc::new(store.users()),
            hasher.clone(),
        ));
        let token_service: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(
            JwtKeys::from_config(&config.jwt),
            Arc::new(store.tokens()),
        ));
        let auth_service: Arc<dyn AuthService> = Arc::new(DefaultAuthService::new(
            user_service.clone(),
            token_service.clone(),
            hasher,
            Arc::new(GoogleIdTokenVerifier::from_config(&config.google)?),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            user_service,
            token_service,
            auth_service,
            prometheus_handle,
        })
    }

    /// Fresh per-request context bounded by `general.request_timeout_seconds`.
    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(Duration::from_secs(
            self.config.general.request_timeout_seconds,
        ))
    }
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_url,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new(config.security.clone()));

    Ok(Arc::new(AppState::new(
        config,
        store,
        hasher,
        prometheus_handle,
    )?))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh-tokens", post(auth::refresh_tokens))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/google", post(auth::google_login))
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/auth/send-verification-email",
            post(auth::send_verification_email),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
