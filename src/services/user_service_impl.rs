//! Store-backed implementation of the `UserService` trait.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::db::{NewUser, StoreError, UserFilter, UserPatch, UserStore};
use crate::services::password::PasswordHasher;
use crate::services::user_service::{
    CreateUser, GoogleLogin, QueryUser, UpdatePasswordOrVerification, UpdateUser, User, UserError,
    UserPage, UserService,
};
use crate::validation::Validate;

const DEFAULT_ROLE: &str = "user";

pub struct DefaultUserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl DefaultUserService {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    async fn hash(&self, op: &'static str, plain: &str) -> Result<String, UserError> {
        self.hasher.hash(plain).await.map_err(|e| {
            error!(op, error = %e, "Password hashing failed");
            UserError::Internal("failed to hash password".to_string())
        })
    }
}

fn check<T: Validate>(op: &'static str, input: &T) -> Result<(), UserError> {
    input.validate().map_err(|e| {
        debug!(op, error = %e, "Validation failed");
        UserError::Validation(e)
    })
}

/// Runs a store call under the request context and maps its failure.
async fn call<T, F>(ctx: &RequestContext, op: &'static str, fut: F) -> Result<T, UserError>
where
    F: Future<Output = Result<T, StoreError>> + Send,
{
    match ctx.run(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::NotFound)) => Err(UserError::NotFound),
        Ok(Err(StoreError::UniqueViolation(detail))) => {
            warn!(op, %detail, "Duplicate email");
            Err(UserError::Conflict("Email already exists".to_string()))
        }
        Ok(Err(StoreError::Database(e))) => {
            error!(op, error = %e, "Store call failed");
            Err(UserError::Internal(e.to_string()))
        }
        Err(e) => {
            warn!(op, error = %e, "Store call aborted");
            Err(UserError::Cancelled(e))
        }
    }
}

#[async_trait]
impl UserService for DefaultUserService {
    async fn list(&self, ctx: &RequestContext, query: &QueryUser) -> Result<UserPage, UserError> {
        check("list_users", query)?;

        let filter = UserFilter::search(query.search.clone().unwrap_or_default());
        // Both are positive after validation.
        let limit = query.limit().unsigned_abs();
        let offset = query.offset().unsigned_abs();

        let total = call(ctx, "list_users", self.store.count(&filter)).await?;
        let users = call(
            ctx,
            "list_users",
            self.store.find_many(&filter, limit, offset),
        )
        .await?;

        Ok(UserPage { users, total })
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: i32) -> Result<User, UserError> {
        call(ctx, "get_user", self.store.find_one(&UserFilter::by_id(id))).await
    }

    async fn get_by_email(&self, ctx: &RequestContext, email: &str) -> Result<User, UserError> {
        call(
            ctx,
            "get_user_by_email",
            self.store.find_one(&UserFilter::by_email(email)),
        )
        .await
    }

    async fn create(&self, ctx: &RequestContext, input: CreateUser) -> Result<User, UserError> {
        check("create_user", &input)?;

        let password = self.hash("create_user", &input.password).await?;

        let new_user = NewUser {
            name: input.name,
            email: input.email,
            password: Some(password),
            role: input.role,
            verified_email: false,
        };

        call(ctx, "create_user", self.store.create(new_user)).await
    }

    async fn upsert_external_identity(
        &self,
        ctx: &RequestContext,
        input: GoogleLogin,
    ) -> Result<User, UserError> {
        check("upsert_external_identity", &input)?;
        let verified_email = input.verified_email.unwrap_or_default();

        match self.get_by_email(ctx, &input.email).await {
            Ok(existing) => {
                let patch = UserPatch {
                    verified_email: Some(verified_email),
                    ..UserPatch::default()
                };
                let affected = call(
                    ctx,
                    "upsert_external_identity",
                    self.store.update_partial(existing.id, patch),
                )
                .await?;
                if affected == 0 {
                    return Err(UserError::NotFound);
                }
                self.get_by_id(ctx, existing.id).await
            }
            Err(UserError::NotFound) => {
                let new_user = NewUser {
                    name: input.name,
                    email: input.email,
                    password: None,
                    role: DEFAULT_ROLE.to_string(),
                    verified_email,
                };
                call(ctx, "upsert_external_identity", self.store.create(new_user)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        input: UpdateUser,
        id: i32,
    ) -> Result<User, UserError> {
        check("update_user", &input)?;

        if input.is_empty() {
            return Err(UserError::BadRequest("No fields to update".to_string()));
        }

        let password = match input.password.as_deref() {
            Some(plain) => Some(self.hash("update_user", plain).await?),
            None => None,
        };

        let patch = UserPatch {
            name: input.name,
            email: input.email,
            password,
            verified_email: None,
        };

        // A unique violation surfaces from `call` before rows are inspected.
        let affected = call(ctx, "update_user", self.store.update_partial(id, patch)).await?;
        if affected == 0 {
            return Err(UserError::NotFound);
        }

        self.get_by_id(ctx, id).await
    }

    async fn update_password_or_verification(
        &self,
        ctx: &RequestContext,
        input: UpdatePasswordOrVerification,
        id: i32,
    ) -> Result<(), UserError> {
        check("update_password_or_verification", &input)?;

        if input.password.is_none() && input.verified_email != Some(true) {
            return Err(UserError::BadRequest("Invalid request".to_string()));
        }

        let password = match input.password.as_deref() {
            Some(plain) => Some(self.hash("update_password_or_verification", plain).await?),
            None => None,
        };

        let patch = UserPatch {
            password,
            verified_email: input.verified_email,
            ..UserPatch::default()
        };

        let affected = call(
            ctx,
            "update_password_or_verification",
            self.store.update_partial(id, patch),
        )
        .await?;
        if affected == 0 {
            return Err(UserError::NotFound);
        }

        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: i32) -> Result<(), UserError> {
        let affected = call(ctx, "delete_user", self.store.delete(id)).await?;
        if affected == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::db::Store;
    use crate::entities::users;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic stand-in for Argon2 so tests stay fast.
    pub(crate) struct PlainHasher;

    #[async_trait]
    impl PasswordHasher for PlainHasher {
        async fn hash(&self, plain: &str) -> anyhow::Result<String> {
            Ok(format!("hashed:{plain}"))
        }

        async fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
            Ok(hash == format!("hashed:{plain}"))
        }
    }

    /// Wraps a real store and counts how often it is reached.
    struct CountingStore {
        inner: Arc<dyn UserStore>,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UserStore for CountingStore {
        async fn find_many(
            &self,
            filter: &UserFilter,
            limit: u64,
            offset: u64,
        ) -> Result<Vec<users::Model>, StoreError> {
            self.hit();
            self.inner.find_many(filter, limit, offset).await
        }

        async fn count(&self, filter: &UserFilter) -> Result<u64, StoreError> {
            self.hit();
            self.inner.count(filter).await
        }

        async fn find_one(&self, filter: &UserFilter) -> Result<users::Model, StoreError> {
            self.hit();
            self.inner.find_one(filter).await
        }

        async fn create(&self, user: NewUser) -> Result<users::Model, StoreError> {
            self.hit();
            self.inner.create(user).await
        }

        async fn update_partial(&self, id: i32, patch: UserPatch) -> Result<u64, StoreError> {
            self.hit();
            self.inner.update_partial(id, patch).await
        }

        async fn delete(&self, id: i32) -> Result<u64, StoreError> {
            self.hit();
            self.inner.delete(id).await
        }
    }

    async fn counting_service() -> (DefaultUserService, Arc<CountingStore>) {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let counting = Arc::new(CountingStore {
            inner: Arc::new(store.users()),
            calls: AtomicUsize::new(0),
        });
        let service = DefaultUserService::new(counting.clone(), Arc::new(PlainHasher));
        (service, counting)
    }

    async fn service() -> DefaultUserService {
        counting_service().await.0
    }

    fn create_input(name: &str, email: &str, role: &str) -> CreateUser {
        CreateUser {
            name: name.to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            role: role.to_string(),
        }
    }

    fn bg() -> RequestContext {
        RequestContext::background()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let svc = service().await;
        let created = svc
            .create(&bg(), create_input("John Doe", "jhon@doe.com", "admin"))
            .await
            .unwrap();

        assert_eq!(created.password.as_deref(), Some("hashed:password123"));
        assert_eq!(created.role, "admin");
        assert!(!created.verified_email);

        let fetched = svc.get_by_id(&bg(), created.id).await.unwrap();
        assert_eq!(fetched, created);

        let by_email = svc.get_by_email(&bg(), "jhon@doe.com").await.unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let svc = service().await;
        svc.create(&bg(), create_input("First", "dup@example.com", "user"))
            .await
            .unwrap();

        let err = svc
            .create(&bg(), create_input("Second", "dup@example.com", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Conflict(_)), "{err:?}");
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let (svc, store) = counting_service().await;

        let err = svc
            .create(&bg(), create_input("Jo", "nope", "root"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Validation(_)));

        let err = svc
            .update(&bg(), UpdateUser::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::BadRequest(_)));

        let err = svc
            .update_password_or_verification(
                &bg(),
                UpdatePasswordOrVerification {
                    password: None,
                    verified_email: Some(false),
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::BadRequest(_)));

        let bad_query = QueryUser {
            page: Some("0".to_string()),
            ..QueryUser::default()
        };
        assert!(matches!(
            svc.list(&bg(), &bad_query).await,
            Err(UserError::Validation(_))
        ));

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let svc = service().await;

        assert!(matches!(svc.get_by_id(&bg(), 42).await, Err(UserError::NotFound)));
        assert!(matches!(
            svc.get_by_email(&bg(), "ghost@example.com").await,
            Err(UserError::NotFound)
        ));

        let update = UpdateUser {
            name: Some("Nobody".to_string()),
            ..UpdateUser::default()
        };
        assert!(matches!(
            svc.update(&bg(), update, 42).await,
            Err(UserError::NotFound)
        ));

        let verify = UpdatePasswordOrVerification {
            password: None,
            verified_email: Some(true),
        };
        assert!(matches!(
            svc.update_password_or_verification(&bg(), verify, 42).await,
            Err(UserError::NotFound)
        ));

        assert!(matches!(svc.delete(&bg(), 42).await, Err(UserError::NotFound)));
    }

    #[tokio::test]
    async fn list_searches_and_counts_the_full_match_set() {
        let svc = service().await;
        for (name, email, role) in [
            ("Plain One", "one@example.com", "user"),
            ("Admin Two", "two@example.com", "admin"),
            ("Plain Three", "three@admin.io", "user"),
            ("Root Four", "four@example.com", "admin"),
            ("Plain Five", "five@example.com", "user"),
        ] {
            svc.create(&bg(), create_input(name, email, role)).await.unwrap();
        }

        let query = QueryUser {
            page: Some("1".to_string()),
            limit: Some("2".to_string()),
            search: Some("admin".to_string()),
        };
        let page = svc.list(&bg(), &query).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<_> = page.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Root Four", "Plain Three"]);

        let query = QueryUser {
            page: Some("2".to_string()),
            ..query
        };
        let page = svc.list(&bg(), &query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.users.len(), 1);
        assert_eq!(page.users[0].name, "Admin Two");

        let everything = svc.list(&bg(), &QueryUser::default()).await.unwrap();
        assert_eq!(everything.total, 5);
        assert_eq!(everything.users.len(), 5);
        assert_eq!(everything.users[0].name, "Plain Five");
    }

    #[tokio::test]
    async fn update_writes_only_supplied_fields() {
        let svc = service().await;
        let created = svc
            .create(&bg(), create_input("Before", "before@example.com", "user"))
            .await
            .unwrap();

        let updated = svc
            .update(
                &bg(),
                UpdateUser {
                    name: Some("After".to_string()),
                    password: Some("newpass99".to_string()),
                    ..UpdateUser::default()
                },
                created.id,
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "After");
        assert_eq!(updated.email, "before@example.com");
        assert_eq!(updated.password.as_deref(), Some("hashed:newpass99"));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_to_taken_email_conflicts() {
        let svc = service().await;
        svc.create(&bg(), create_input("Taken", "taken@example.com", "user"))
            .await
            .unwrap();
        let other = svc
            .create(&bg(), create_input("Other", "other@example.com", "user"))
            .await
            .unwrap();

        let err = svc
            .update(
                &bg(),
                UpdateUser {
                    email: Some("taken@example.com".to_string()),
                    ..UpdateUser::default()
                },
                other.id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Conflict(_)), "{err:?}");
    }

    #[tokio::test]
    async fn password_or_verification_update() {
        let svc = service().await;
        let created = svc
            .create(&bg(), create_input("Verify Me", "verify@example.com", "user"))
            .await
            .unwrap();

        svc.update_password_or_verification(
            &bg(),
            UpdatePasswordOrVerification {
                password: None,
                verified_email: Some(true),
            },
            created.id,
        )
        .await
        .unwrap();

        let user = svc.get_by_id(&bg(), created.id).await.unwrap();
        assert!(user.verified_email);
        assert_eq!(user.password, created.password);

        svc.update_password_or_verification(
            &bg(),
            UpdatePasswordOrVerification {
                password: Some("another1".to_string()),
                verified_email: None,
            },
            created.id,
        )
        .await
        .unwrap();

        let user = svc.get_by_id(&bg(), created.id).await.unwrap();
        assert!(user.verified_email);
        assert_eq!(user.password.as_deref(), Some("hashed:another1"));
    }

    #[tokio::test]
    async fn external_identity_creates_then_only_flips_the_flag() {
        let svc = service().await;

        let first = svc
            .upsert_external_identity(
                &bg(),
                GoogleLogin {
                    name: "Google User".to_string(),
                    email: "g@example.com".to_string(),
                    verified_email: Some(false),
                },
            )
            .await
            .unwrap();
        assert!(!first.verified_email);
        assert!(first.password.is_none());
        assert_eq!(first.role, "user");

        let second = svc
            .upsert_external_identity(
                &bg(),
                GoogleLogin {
                    name: "Renamed Elsewhere".to_string(),
                    email: "g@example.com".to_string(),
                    verified_email: Some(true),
                },
            )
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert!(second.verified_email);
        assert_eq!(second.name, "Google User");
        assert_eq!(second.email, "g@example.com");
        assert!(second.password.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_user() {
        let svc = service().await;
        let created = svc
            .create(&bg(), create_input("Gone Soon", "gone@example.com", "user"))
            .await
            .unwrap();

        svc.delete(&bg(), created.id).await.unwrap();
        assert!(matches!(
            svc.get_by_id(&bg(), created.id).await,
            Err(UserError::NotFound)
        ));
    }

    #[tokio::test]
    async fn cancelled_context_aborts_store_calls() {
        let svc = service().await;
        let (ctx, handle) = RequestContext::cancellable();
        handle.cancel();

        let err = svc.get_by_id(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, UserError::Cancelled(ContextError::Cancelled)));
    }
}
