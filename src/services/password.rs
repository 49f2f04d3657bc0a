//! One-way password hashing.

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use tokio::task;

use crate::config::SecurityConfig;

#[async_trait::async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plain: &str) -> Result<String>;

    async fn verify(&self, plain: &str, hash: &str) -> Result<bool>;
}

/// Argon2id with parameters from [`SecurityConfig`].
///
/// Hashing is CPU-bound, so both operations run on the blocking pool.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    config: SecurityConfig,
}

impl Argon2Hasher {
    #[must_use]
    pub const fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    fn argon2(config: &SecurityConfig) -> Result<Argon2<'static>> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

#[async_trait::async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, plain: &str) -> Result<String> {
        let config = self.config.clone();
        let password = plain.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let hash = Self::argon2(&config)?
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
            Ok::<String, anyhow::Error>(hash.to_string())
        })
        .await
        .context("Password hashing task panicked")?
    }

    async fn verify(&self, plain: &str, hash: &str) -> Result<bool> {
        let password = plain.to_string();
        let hash = hash.to_string();

        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            // Parameters are read from the PHC string, not the current config.
            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }
}
