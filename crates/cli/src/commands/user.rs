//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a verified user; the password comes from the environment
//! MODERNSHOP_NEW_USER_PASSWORD=... ms-cli user create -u alice -e alice@example.com --admin
//!
//! # Grant or revoke admin
//! ms-cli user set-admin -u alice --admin false
//! ```

use modernshop_core::{Email, UserId, Username};
use modernshop_storefront::db::{UserRepository, UserStore};
use modernshop_storefront::models::{NewUser, UserUpdate};
use modernshop_storefront::services::auth::{hash_password, validate_password};

use super::{CommandError, connect};

/// Env var holding the new user's password. Never taken as an argument so
/// it stays out of shell history.
pub const PASSWORD_ENV_VAR: &str = "MODERNSHOP_NEW_USER_PASSWORD";

/// Create a verified, admin-verified user.
///
/// # Errors
///
/// Fails on invalid input, a missing password, or a taken username/email.
pub async fn create(username: &str, email: &str, admin: bool) -> Result<UserId, CommandError> {
    let username = Username::parse(username).map_err(|e| CommandError::Invalid(e.to_string()))?;
    let email = Email::parse(email).map_err(|e| CommandError::Invalid(e.to_string()))?;

    dotenvy::dotenv().ok();
    let password =
        std::env::var(PASSWORD_ENV_VAR).map_err(|_| CommandError::MissingEnvVar(PASSWORD_ENV_VAR))?;
    validate_password(&password).map_err(|e| CommandError::Invalid(e.to_string()))?;
    let hash = hash_password(&password).map_err(|e| CommandError::Invalid(e.to_string()))?;

    let pool = connect().await?;
    let users = UserRepository::new(pool);

    let mut new_user = NewUser::with_password(username, Some(email), hash);
    new_user.is_verified = true;
    new_user.is_admin_verified = true;
    new_user.is_admin = admin;

    let user = users.create(new_user).await?;
    tracing::info!(user_id = %user.id, username = %user.username, admin, "User created");
    Ok(user.id)
}

/// Grant or revoke the admin flag.
///
/// # Errors
///
/// Fails if the user does not exist or the update fails.
pub async fn set_admin(username: &str, admin: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let users = UserRepository::new(pool);

    let user = users
        .get_by_username(username)
        .await?
        .ok_or_else(|| CommandError::UserNotFound(username.to_owned()))?;

    users
        .update(
            user.id,
            UserUpdate {
                is_admin: Some(admin),
                ..UserUpdate::default()
            },
        )
        .await?;
    tracing::info!(user_id = %user.id, username, admin, "Admin flag updated");
    Ok(())
}
