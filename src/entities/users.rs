use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id hash; `None` for accounts created through Google sign-in.
    pub password: Option<String>,

    #[sea_orm(default_value = "user")]
    pub role: String,

    #[sea_orm(default_value = false)]
    pub verified_email: bool,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tokens::Entity")]
    Tokens,

    #[sea_orm(has_many = "super::short_urls::Entity")]
    ShortUrls,
}

impl Related<super::tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl Related<super::short_urls::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShortUrls.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
