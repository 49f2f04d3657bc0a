pub use super::short_urls::Entity as ShortUrls;
pub use super::tokens::Entity as Tokens;
pub use super::users::Entity as Users;
