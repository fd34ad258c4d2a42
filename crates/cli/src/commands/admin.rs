//! Admin account commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first admin
//! tp-cli admin seed -e admin@example.com -n "Admin Name" -p 'long-random-password'
//!
//! # Promote an existing customer
//! tp-cli admin promote -e someone@example.com
//! ```
//!
//! The first admin can only be created from here; no HTTP route does it.

use tradepost_api::db::UserRepository;
use tradepost_api::services::{AuthError, AuthService};
use tradepost_core::{Email, Role, UserId};

use super::{CliError, connect};

/// Create a new admin account.
///
/// Goes through the same email, password and name validation as sign-up.
///
/// # Errors
///
/// Returns `CliError::Auth` if the input is invalid or the email is taken.
pub async fn seed(email: &str, name: &str, password: &str) -> Result<UserId, CliError> {
    let pool = connect().await?;

    let user = AuthService::new(&pool)
        .create_user(email, password, name, Role::Admin)
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "Admin user created");
    Ok(user.id)
}

/// Promote an existing user to admin.
///
/// # Errors
///
/// Returns `CliError` if no user has this email or they are already an admin.
pub async fn promote(email: &str) -> Result<UserId, CliError> {
    let email = Email::parse(email).map_err(AuthError::from)?;
    let pool = connect().await?;
    let users = UserRepository::new(&pool);

    let user = users
        .get_by_email(&email)
        .await
        .map_err(AuthError::from)?
        .ok_or_else(|| CliError::UserNotFound(email.to_string()))?;
    if user.role.is_admin() {
        return Err(CliError::AlreadyAdmin(email.to_string()));
    }

    let user = users.set_role(user.id, Role::Admin).await.map_err(AuthError::from)?;
    tracing::info!(user_id = %user.id, email = %email, "User promoted to admin");
    Ok(user.id)
}
