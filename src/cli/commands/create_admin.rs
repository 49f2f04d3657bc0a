//! Create-admin command handler

use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::context::RequestContext;
use crate::db::Store;
use crate::services::user_service::CreateUser;
use crate::services::{Argon2Hasher, DefaultUserService, UserError, UserService};

pub async fn cmd_create_admin(
    config: &Config,
    name: String,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_url).await?;
    let service = DefaultUserService::new(
        Arc::new(store.users()),
        Arc::new(Argon2Hasher::new(config.security.clone())),
    );

    let input = CreateUser {
        name,
        email,
        password,
        role: "admin".to_string(),
    };

    match service.create(&RequestContext::background(), input).await {
        Ok(user) => {
            println!("✓ Admin {} created (id {})", user.email, user.id);
            Ok(())
        }
        Err(UserError::Validation(errors)) => {
            for (field, message) in errors.to_map() {
                println!("  {field}: {message}");
            }
            anyhow::bail!("Invalid admin details")
        }
        Err(e) => Err(e).context("Failed to create admin"),
    }
}
