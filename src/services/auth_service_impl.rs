//! Default implementation of the `AuthService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::services::auth_service::{
    AuthError, AuthService, AuthSession, ForgotPassword, GoogleIdToken, Login, RefreshToken,
    Register, ResetPassword, TokenQuery,
};
use crate::services::google::GoogleVerifier;
use crate::services::password::PasswordHasher;
use crate::services::token_service::{
    AuthTokens, IssuedToken, TokenError, TokenKind, TokenService,
};
use crate::services::user_service::{
    CreateUser, GoogleLogin, UpdatePasswordOrVerification, UserError, UserService,
};
use crate::validation::Validate;

pub struct DefaultAuthService {
    users: Arc<dyn UserService>,
    tokens: Arc<dyn TokenService>,
    hasher: Arc<dyn PasswordHasher>,
    google: Arc<dyn GoogleVerifier>,
}

impl DefaultAuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserService>,
        tokens: Arc<dyn TokenService>,
        hasher: Arc<dyn PasswordHasher>,
        google: Arc<dyn GoogleVerifier>,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            google,
        }
    }
}

#[async_trait]
impl AuthService for DefaultAuthService {
    async fn register(
        &self,
        ctx: &RequestContext,
        input: Register,
    ) -> Result<AuthSession, AuthError> {
        input.validate()?;

        let user = self
            .users
            .create(
                ctx,
                CreateUser {
                    name: input.name,
                    email: input.email,
                    password: input.password,
                    role: "user".to_string(),
                },
            )
            .await?;

        let tokens = self.tokens.generate_auth_tokens(ctx, &user).await?;
        info!(user_id = user.id, "User registered");
        Ok(AuthSession { user, tokens })
    }

    async fn login(&self, ctx: &RequestContext, input: Login) -> Result<AuthSession, AuthError> {
        input.validate()?;

        let user = match self.users.get_by_email(ctx, &input.email).await {
            Ok(user) => user,
            Err(UserError::NotFound) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        // Google accounts have no password to check against.
        let Some(hash) = user.password.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(&input.password, hash).await? {
            warn!(user_id = user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.tokens.generate_auth_tokens(ctx, &user).await?;
        Ok(AuthSession { user, tokens })
    }

    async fn logout(&self, ctx: &RequestContext, input: RefreshToken) -> Result<(), AuthError> {
        input.validate()?;
        self.tokens
            .revoke(ctx, &input.refresh_token, TokenKind::Refresh)
            .await?;
        Ok(())
    }

    async fn refresh(
        &self,
        ctx: &RequestContext,
        input: RefreshToken,
    ) -> Result<AuthTokens, AuthError> {
        input.validate()?;

        let user_id = self
            .tokens
            .verify_token(ctx, &input.refresh_token, TokenKind::Refresh)
            .await?;

        let user = match self.users.get_by_id(ctx, user_id).await {
            Ok(user) => user,
            Err(UserError::NotFound) => {
                return Err(AuthError::Unauthorized("Please authenticate".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        // A concurrent refresh may have consumed the token after it verified.
        match self
            .tokens
            .revoke(ctx, &input.refresh_token, TokenKind::Refresh)
            .await
        {
            Ok(()) => {}
            Err(TokenError::NotFound) => {
                warn!(user_id, "Refresh token already used");
                return Err(TokenError::Invalid.into());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.tokens.generate_auth_tokens(ctx, &user).await?)
    }

    async fn forgot_password(
        &self,
        ctx: &RequestContext,
        input: ForgotPassword,
    ) -> Result<IssuedToken, AuthError> {
        input.validate()?;

        let user = self.users.get_by_email(ctx, &input.email).await?;
        let token = self
            .tokens
            .generate_reset_password_token(ctx, user.id)
            .await?;
        info!(user_id = user.id, "Reset password token issued");
        Ok(token)
    }

    async fn reset_password(
        &self,
        ctx: &RequestContext,
        query: TokenQuery,
        input: ResetPassword,
    ) -> Result<(), AuthError> {
        query.validate()?;
        input.validate()?;

        let user_id = self
            .tokens
            .verify_token(ctx, &query.token, TokenKind::ResetPassword)
            .await?;

        self.users
            .update_password_or_verification(
                ctx,
                UpdatePasswordOrVerification {
                    password: Some(input.password),
                    verified_email: None,
                },
                user_id,
            )
            .await?;

        self.tokens
            .revoke_all(ctx, user_id, TokenKind::ResetPassword)
            .await?;
        Ok(())
    }

    async fn send_verification(
        &self,
        ctx: &RequestContext,
        user_id: i32,
    ) -> Result<IssuedToken, AuthError> {
        let user = self.users.get_by_id(ctx, user_id).await?;
        if user.verified_email {
            return Err(AuthError::BadRequest("Email is already verified".to_string()));
        }

        Ok(self
            .tokens
            .generate_verify_email_token(ctx, user.id)
            .await?)
    }

    async fn verify_email(&self, ctx: &RequestContext, query: TokenQuery) -> Result<(), AuthError> {
        query.validate()?;

        let user_id = self
            .tokens
            .verify_token(ctx, &query.token, TokenKind::VerifyEmail)
            .await?;

        self.users
            .update_password_or_verification(
                ctx,
                UpdatePasswordOrVerification {
                    password: None,
                    verified_email: Some(true),
                },
                user_id,
            )
            .await?;

        self.tokens
            .revoke_all(ctx, user_id, TokenKind::VerifyEmail)
            .await?;
        Ok(())
    }

    async fn google_login(
        &self,
        ctx: &RequestContext,
        input: GoogleIdToken,
    ) -> Result<AuthSession, AuthError> {
        input.validate()?;

        let identity = self.google.verify(ctx, &input.id_token).await?;
        if !identity.email_verified {
            warn!(email = %identity.email, "Google sign-in with unverified email");
            return Err(AuthError::Unauthorized(
                "Google account email is not verified".to_string(),
            ));
        }

        let name = identity
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| identity.email.clone());
        let user = self
            .users
            .upsert_external_identity(
                ctx,
                GoogleLogin {
                    name,
                    email: identity.email,
                    verified_email: Some(true),
                },
            )
            .await?;
        info!(user_id = user.id, "Google sign-in");
        let tokens = self.tokens.generate_auth_tokens(ctx, &user).await?;
        Ok(AuthSession { user, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::db::Store;
    use crate::services::google::tests as google;
    use crate::services::token_service::Claims;
    use crate::services::token_service_impl::{JwtKeys, JwtTokenService};
    use crate::services::user_service_impl::DefaultUserService;
    use crate::services::user_service::User;
    use crate::services::user_service_impl::tests::PlainHasher;

    struct Harness {
        auth: DefaultAuthService,
        users: Arc<dyn UserService>,
        tokens: Arc<dyn TokenService>,
        hasher: Arc<dyn PasswordHasher>,
    }

    impl Harness {
        fn with_tokens(&self, tokens: Arc<dyn TokenService>) -> DefaultAuthService {
            DefaultAuthService::new(
                self.users.clone(),
                tokens,
                self.hasher.clone(),
                Arc::new(google::verifier()),
            )
        }
    }

    /// Loses every refresh race: another request revokes the token first.
    struct RaceLost(Arc<dyn TokenService>);

    #[async_trait]
    impl TokenService for RaceLost {
        async fn generate_auth_tokens(
            &self,
            ctx: &RequestContext,
            user: &User,
        ) -> Result<AuthTokens, TokenError> {
            self.0.generate_auth_tokens(ctx, user).await
        }

        fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
            self.0.verify_access(token)
        }

        async fn verify_token(
            &self,
            ctx: &RequestContext,
            token: &str,
            kind: TokenKind,
        ) -> Result<i32, TokenError> {
            self.0.verify_token(ctx, token, kind).await
        }

        async fn generate_reset_password_token(
            &self,
            ctx: &RequestContext,
            user_id: i32,
        ) -> Result<IssuedToken, TokenError> {
            self.0.generate_reset_password_token(ctx, user_id).await
        }

        async fn generate_verify_email_token(
            &self,
            ctx: &RequestContext,
            user_id: i32,
        ) -> Result<IssuedToken, TokenError> {
            self.0.generate_verify_email_token(ctx, user_id).await
        }

        async fn revoke(
            &self,
            ctx: &RequestContext,
            token: &str,
            kind: TokenKind,
        ) -> Result<(), TokenError> {
            self.0.revoke(ctx, token, kind).await?;
            self.0.revoke(ctx, token, kind).await
        }

        async fn revoke_all(
            &self,
            ctx: &RequestContext,
            user_id: i32,
            kind: TokenKind,
        ) -> Result<(), TokenError> {
            self.0.revoke_all(ctx, user_id, kind).await
        }
    }

    async fn harness() -> Harness {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let hasher: Arc<dyn PasswordHasher> = Arc::new(PlainHasher);
        let users: Arc<dyn UserService> =
            Arc::new(DefaultUserService::new(Arc::new(store.users()), hasher.clone()));
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "auth-tests".to_string(),
            ..JwtConfig::default()
        });
        let tokens: Arc<dyn TokenService> =
            Arc::new(JwtTokenService::new(keys, Arc::new(store.tokens())));

        Harness {
            auth: DefaultAuthService::new(
                users.clone(),
                tokens.clone(),
                hasher.clone(),
                Arc::new(google::verifier()),
            ),
            users,
            tokens,
            hasher,
        }
    }

    fn bg() -> RequestContext {
        RequestContext::background()
    }

    fn register_input(email: &str) -> Register {
        Register {
            name: "New Person".to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let h = harness().await;
        let session = h
            .auth
            .register(&bg(), register_input("new@example.com"))
            .await
            .unwrap();
        assert_eq!(session.user.role, "user");

        let again = h
            .auth
            .login(
                &bg(),
                Login {
                    email: "new@example.com".to_string(),
                    password: "password123".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(again.user.id, session.user.id);

        let err = h
            .auth
            .register(&bg(), register_input("new@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let h = harness().await;
        h.auth
            .register(&bg(), register_input("real@example.com"))
            .await
            .unwrap();

        for (email, password) in [
            ("real@example.com", "wrongpass1"),
            ("ghost@example.com", "password123"),
        ] {
            let err = h
                .auth
                .login(
                    &bg(),
                    Login {
                        email: email.to_string(),
                        password: password.to_string(),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials), "{email}");
        }
    }

    #[tokio::test]
    async fn google_accounts_cannot_use_password_login() {
        let h = harness().await;
        h.auth
            .google_login(&bg(), google_token("g@example.com", true))
            .await
            .unwrap();

        let err = h
            .auth
            .login(
                &bg(),
                Login {
                    email: "g@example.com".to_string(),
                    password: "password123".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    fn google_token(email: &str, email_verified: bool) -> GoogleIdToken {
        GoogleIdToken {
            id_token: google::sign(&google::claims(email, email_verified)),
        }
    }

    #[tokio::test]
    async fn google_login_creates_then_reuses_the_account() {
        let h = harness().await;
        let first = h
            .auth
            .google_login(&bg(), google_token("g@example.com", true))
            .await
            .unwrap();
        assert!(first.user.verified_email);
        assert!(first.user.password.is_none());
        assert_eq!(first.user.name, "Google User");
        assert_eq!(first.user.role, "user");

        let second = h
            .auth
            .google_login(&bg(), google_token("g@example.com", true))
            .await
            .unwrap();
        assert_eq!(second.user.id, first.user.id);
    }

    #[tokio::test]
    async fn google_login_marks_existing_password_account_verified() {
        let h = harness().await;
        let session = h
            .auth
            .register(&bg(), register_input("both@example.com"))
            .await
            .unwrap();
        assert!(!session.user.verified_email);

        let google = h
            .auth
            .google_login(&bg(), google_token("both@example.com", true))
            .await
            .unwrap();
        assert_eq!(google.user.id, session.user.id);
        assert!(google.user.verified_email);
    }

    #[tokio::test]
    async fn google_login_rejects_forged_and_unverified_tokens() {
        let h = harness().await;
        h.auth
            .register(&bg(), register_input("victim@example.com"))
            .await
            .unwrap();

        let mut foreign = google::claims("victim@example.com", true);
        foreign["aud"] = serde_json::json!("another-client");

        for input in [
            GoogleIdToken {
                id_token: google::sign(&foreign),
            },
            GoogleIdToken {
                id_token: "eyJhbGciOiJub25lIn0.eyJlbWFpbCI6InZpY3RpbUBleGFtcGxlLmNvbSJ9.".to_string(),
            },
            google_token("victim@example.com", false),
        ] {
            assert!(matches!(
                h.auth.google_login(&bg(), input).await,
                Err(AuthError::Unauthorized(_))
            ));
        }

        assert!(matches!(
            h.auth.google_login(&bg(), GoogleIdToken::default()).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn losing_a_refresh_race_is_unauthorized() {
        let h = harness().await;
        let session = h
            .auth
            .register(&bg(), register_input("race@example.com"))
            .await
            .unwrap();

        let auth = h.with_tokens(Arc::new(RaceLost(h.tokens.clone())));
        let err = auth
            .refresh(
                &bg(),
                RefreshToken {
                    refresh_token: session.tokens.refresh.token,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)), "{err:?}");
    }

    #[tokio::test]
    async fn refresh_rotates_and_logout_revokes() {
        let h = harness().await;
        let session = h
            .auth
            .register(&bg(), register_input("rotate@example.com"))
            .await
            .unwrap();
        let old = RefreshToken {
            refresh_token: session.tokens.refresh.token.clone(),
        };

        let fresh = h.auth.refresh(&bg(), old.clone()).await.unwrap();
        assert_ne!(fresh.refresh.token, old.refresh_token);

        assert!(matches!(
            h.auth.refresh(&bg(), old.clone()).await,
            Err(AuthError::Unauthorized(_))
        ));

        let current = RefreshToken {
            refresh_token: fresh.refresh.token,
        };
        h.auth.logout(&bg(), current.clone()).await.unwrap();
        assert!(matches!(
            h.auth.logout(&bg(), current).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reset_password_flow() {
        let h = harness().await;
        h.auth
            .register(&bg(), register_input("forgot@example.com"))
            .await
            .unwrap();

        let issued = h
            .auth
            .forgot_password(
                &bg(),
                ForgotPassword {
                    email: "forgot@example.com".to_string(),
                },
            )
            .await
            .unwrap();

        let query = TokenQuery {
            token: issued.token,
        };
        h.auth
            .reset_password(
                &bg(),
                query.clone(),
                ResetPassword {
                    password: "brandnew1".to_string(),
                },
            )
            .await
            .unwrap();

        h.auth
            .login(
                &bg(),
                Login {
                    email: "forgot@example.com".to_string(),
                    password: "brandnew1".to_string(),
                },
            )
            .await
            .unwrap();

        // Single use.
        let err = h
            .auth
            .reset_password(
                &bg(),
                query,
                ResetPassword {
                    password: "another22".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email() {
        let h = harness().await;
        let err = h
            .auth
            .forgot_password(
                &bg(),
                ForgotPassword {
                    email: "nobody@example.com".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn verify_email_flow() {
        let h = harness().await;
        let session = h
            .auth
            .register(&bg(), register_input("verify@example.com"))
            .await
            .unwrap();

        let issued = h
            .auth
            .send_verification(&bg(), session.user.id)
            .await
            .unwrap();
        h.auth
            .verify_email(
                &bg(),
                TokenQuery {
                    token: issued.token,
                },
            )
            .await
            .unwrap();

        let user = h.users.get_by_id(&bg(), session.user.id).await.unwrap();
        assert!(user.verified_email);

        assert!(matches!(
            h.auth.send_verification(&bg(), user.id).await,
            Err(AuthError::BadRequest(_))
        ));
    }
}
