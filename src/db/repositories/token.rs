use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use super::{NewToken, StoreError, TokenStore};
use crate::entities::{prelude::*, tokens};

pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl TokenStore for TokenRepository {
    async fn create(&self, token: NewToken) -> Result<tokens::Model, StoreError> {
        let now = Utc::now();

        let active = tokens::ActiveModel {
            user_id: Set(token.user_id),
            token: Set(token.token),
            token_type: Set(token.token_type),
            expires_at: Set(token.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    async fn find_valid(
        &self,
        token: &str,
        token_type: &str,
        now: DateTime<Utc>,
    ) -> Result<tokens::Model, StoreError> {
        Tokens::find()
            .filter(tokens::Column::Token.eq(token))
            .filter(tokens::Column::TokenType.eq(token_type))
            .filter(tokens::Column::ExpiresAt.gt(now))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_by_token(&self, token: &str, token_type: &str) -> Result<u64, StoreError> {
        let result = Tokens::delete_many()
            .filter(tokens::Column::Token.eq(token))
            .filter(tokens::Column::TokenType.eq(token_type))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    async fn delete_for_user(&self, user_id: i32, token_type: &str) -> Result<u64, StoreError> {
        let result = Tokens::delete_many()
            .filter(tokens::Column::UserId.eq(user_id))
            .filter(tokens::Column::TokenType.eq(token_type))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }
}
