use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use super::{NewUser, StoreError, UserFilter, UserPatch, UserStore};
use crate::entities::users;

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn condition(filter: &UserFilter) -> Condition {
        let mut cond = Condition::all();

        if let Some(id) = filter.id {
            cond = cond.add(users::Column::Id.eq(id));
        }

        if let Some(email) = &filter.email {
            cond = cond.add(users::Column::Email.eq(email.as_str()));
        }

        // SQLite LIKE folds ASCII case, instr() does not.
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            cond = cond.add(
                Condition::any()
                    .add(Expr::cust_with_values("instr(\"name\", ?) > 0", [search]))
                    .add(Expr::cust_with_values("instr(\"email\", ?) > 0", [search]))
                    .add(Expr::cust_with_values("instr(\"role\", ?) > 0", [search])),
            );
        }

        cond
    }
}

#[async_trait::async_trait]
impl UserStore for UserRepository {
    async fn find_many(
        &self,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<users::Model>, StoreError> {
        let rows = users::Entity::find()
            .filter(Self::condition(filter))
            .order_by_desc(users::Column::CreatedAt)
            .order_by_desc(users::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    async fn count(&self, filter: &UserFilter) -> Result<u64, StoreError> {
        let total = users::Entity::find()
            .filter(Self::condition(filter))
            .count(&self.conn)
            .await?;

        Ok(total)
    }

    async fn find_one(&self, filter: &UserFilter) -> Result<users::Model, StoreError> {
        users::Entity::find()
            .filter(Self::condition(filter))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<users::Model, StoreError> {
        let now = Utc::now();

        let active = users::ActiveModel {
            name: Set(user.name),
            email: Set(user.email),
            password: Set(user.password),
            role: Set(user.role),
            verified_email: Set(user.verified_email),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    async fn update_partial(&self, id: i32, patch: UserPatch) -> Result<u64, StoreError> {
        let mut update = users::Entity::update_many()
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(id));

        if let Some(name) = patch.name {
            update = update.col_expr(users::Column::Name, Expr::value(name));
        }
        if let Some(email) = patch.email {
            update = update.col_expr(users::Column::Email, Expr::value(email));
        }
        if let Some(password) = patch.password {
            update = update.col_expr(users::Column::Password, Expr::value(password));
        }
        if let Some(verified) = patch.verified_email {
            update = update.col_expr(users::Column::VerifiedEmail, Expr::value(verified));
        }

        let result = update.exec(&self.conn).await?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, id: i32) -> Result<u64, StoreError> {
        let result = users::Entity::delete_many()
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }
}
