pub mod prelude;

pub mod short_urls;
pub mod tokens;
pub mod users;
