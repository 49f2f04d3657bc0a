use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_token")
                    .table(Tokens::Table)
                    .col(Tokens::Token)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_user_type")
                    .table(Tokens::Table)
                    .col(Tokens::UserId)
                    .col(Tokens::Type)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_tokens_user_type").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_tokens_token").to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tokens {
    Table,
    Token,
    UserId,
    Type,
}
