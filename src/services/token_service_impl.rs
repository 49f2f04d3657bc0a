//! JWT implementation of the `TokenService` trait.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::context::RequestContext;
use crate::db::{NewToken, StoreError, TokenStore};
use crate::services::token_service::{
    AuthTokens, Claims, IssuedToken, TokenError, TokenKind, TokenService,
};
use crate::services::user_service::User;

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_password_ttl: Duration,
    verify_email_ttl: Duration,
}

impl JwtKeys {
    #[must_use]
    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_exp_minutes),
            refresh_ttl: Duration::days(config.refresh_exp_days),
            reset_password_ttl: Duration::minutes(config.reset_password_exp_minutes),
            verify_email_ttl: Duration::minutes(config.verify_email_exp_minutes),
        }
    }

    const fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::ResetPassword => self.reset_password_ttl,
            TokenKind::VerifyEmail => self.verify_email_ttl,
        }
    }

    pub fn sign(&self, user_id: i32, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires = now + self.ttl(kind);
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| TokenError::Internal(format!("failed to sign token: {e}")))?;
        debug!(user_id, kind = kind.as_str(), "jwt signed");

        Ok(IssuedToken { token, expires })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::Invalid
        })?;
        Ok(data.claims)
    }

    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            debug!(
                expected = kind.as_str(),
                actual = claims.kind.as_str(),
                "jwt has wrong type"
            );
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

pub struct JwtTokenService {
    keys: JwtKeys,
    store: Arc<dyn TokenStore>,
}

impl JwtTokenService {
    #[must_use]
    pub fn new(keys: JwtKeys, store: Arc<dyn TokenStore>) -> Self {
        Self { keys, store }
    }

    async fn issue_persisted(
        &self,
        ctx: &RequestContext,
        user_id: i32,
        kind: TokenKind,
    ) -> Result<IssuedToken, TokenError> {
        let issued = self.keys.sign(user_id, kind)?;
        let row = NewToken {
            user_id,
            token: issued.token.clone(),
            token_type: kind.as_str().to_string(),
            expires_at: issued.expires,
        };
        call(ctx, "persist_token", self.store.create(row)).await?;
        Ok(issued)
    }
}

async fn call<T, F>(ctx: &RequestContext, op: &'static str, fut: F) -> Result<T, TokenError>
where
    F: Future<Output = Result<T, StoreError>> + Send,
{
    match ctx.run(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::NotFound)) => Err(TokenError::NotFound),
        Ok(Err(e)) => {
            error!(op, error = %e, "Token store call failed");
            Err(TokenError::Internal(e.to_string()))
        }
        Err(e) => {
            warn!(op, error = %e, "Token store call aborted");
            Err(TokenError::Cancelled(e))
        }
    }
}

#[async_trait]
impl TokenService for JwtTokenService {
    async fn generate_auth_tokens(
        &self,
        ctx: &RequestContext,
        user: &User,
    ) -> Result<AuthTokens, TokenError> {
        let access = self.keys.sign(user.id, TokenKind::Access)?;
        let refresh = self.issue_persisted(ctx, user.id, TokenKind::Refresh).await?;
        Ok(AuthTokens { access, refresh })
    }

    fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.keys.verify_kind(token, TokenKind::Access)
    }

    async fn verify_token(
        &self,
        ctx: &RequestContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<i32, TokenError> {
        let claims = self.keys.verify_kind(token, kind)?;

        let row = match call(
            ctx,
            "verify_token",
            self.store.find_valid(token, kind.as_str(), Utc::now()),
        )
        .await
        {
            Err(TokenError::NotFound) => return Err(TokenError::Invalid),
            other => other?,
        };

        if row.user_id != claims.sub {
            warn!(
                token_user = row.user_id,
                claimed_user = claims.sub,
                "Persisted token belongs to another user"
            );
            return Err(TokenError::Invalid);
        }

        Ok(claims.sub)
    }

    async fn generate_reset_password_token(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, TokenError> {
        self.revoke_all(ctx, user_id, TokenKind::ResetPassword).await?;
        self.issue_persisted(ctx, user_id, TokenKind::ResetPassword)
            .await
    }

    async fn generate_verify_email_token(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, TokenError> {
        self.revoke_all(ctx, user_id, TokenKind::VerifyEmail).await?;
        self.issue_persisted(ctx, user_id, TokenKind::VerifyEmail)
            .await
    }

    async fn revoke(
        &self,
        ctx: &RequestContext,
        token: &str,
        kind: TokenKind,
    ) -> Result<(), TokenError> {
        let affected = call(
            ctx,
            "revoke_token",
            self.store.delete_by_token(token, kind.as_str()),
        )
        .await?;
        if affected == 0 {
            return Err(TokenError::NotFound);
        }
        Ok(())
    }

    async fn revoke_all(
        &self,
        ctx: &RequestContext,
        user_id: i32,
        kind: TokenKind,
    ) -> Result<(), TokenError> {
        call(
            ctx,
            "revoke_user_tokens",
            self.store.delete_for_user(user_id, kind.as_str()),
        )
        .await?;
        Ok(())
    }
}
