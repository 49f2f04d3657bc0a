pub mod password;
pub use password::{Argon2Hasher, PasswordHasher};

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{User, UserError, UserPage, UserService};
pub use user_service_impl::DefaultUserService;

pub mod token_service;
pub mod token_service_impl;
pub use token_service::{AuthTokens, Claims, IssuedToken, TokenError, TokenKind, TokenService};
pub use token_service_impl::{JwtKeys, JwtTokenService};

pub mod google;
pub use google::{GoogleError, GoogleIdTokenVerifier, GoogleIdentity, GoogleVerifier};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, AuthSession};
pub use auth_service_impl::DefaultAuthService;
