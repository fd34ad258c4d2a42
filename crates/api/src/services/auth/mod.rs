//! Authentication service.
//!
//! Password accounts use Argon2id hashes. Accounts created through Google
//! sign-in have no hash and cannot log in with a password.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use tradepost_core::{Email, Role, UserId};

use crate::db::RepositoryError;
use crate::db::users::{UserRepository, UserUpdate};
use crate::models::user::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Authentication service.
///
/// Handles registration, login, and the user writes that need hashing.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new account. The very first account becomes an admin.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::InvalidName` if the name is blank.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let name = validate_name(name)?;
        let password_hash = hash_password(password)?;

        self.users
            .register(&email, name, &password_hash)
            .await
            .map_err(conflict_as_exists)
    }

    /// Create an account with an explicit role (admin user management).
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let name = validate_name(name)?;
        let password_hash = hash_password(password)?;

        self.users
            .create(&email, name, Some(&password_hash), role)
            .await
            .map_err(conflict_as_exists)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown, the
    /// password is wrong, or the account has no password.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_hash = password_hash.ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Apply a profile update, hashing a new password if one is given.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    /// Returns `AuthError::UserAlreadyExists` if the new email is taken.
    pub async fn update_user(
        &self,
        id: UserId,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User, AuthError> {
        let update = UserUpdate {
            name: name.map(validate_name).transpose()?.map(str::to_owned),
            email: email.map(Email::parse).transpose()?,
            password_hash: match password {
                Some(p) => {
                    validate_password(p)?;
                    Some(hash_password(p)?)
                }
                None => None,
            },
        };

        self.users.update(id, &update).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => conflict_as_exists(other),
        })
    }

    /// Find the account for a Google-verified email, creating a
    /// password-less `USER` on first sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the provider sent a bad address.
    pub async fn find_or_create_oauth_user(
        &self,
        email: &str,
        name: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        if let Some(user) = self.users.get_by_email(&email).await? {
            return Ok(user);
        }

        let name = match name.trim() {
            "" => email.as_str().split('@').next().unwrap_or_default(),
            trimmed => trimmed,
        };

        match self.users.create(&email, name, None, Role::User).await {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent first sign-in.
            Err(RepositoryError::Conflict(_)) => self
                .users
                .get_by_email(&email)
                .await?
                .ok_or(AuthError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

fn conflict_as_exists(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
        other => AuthError::Repository(other),
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Trimmed, non-empty display name.
fn validate_name(name: &str) -> Result<&str, AuthError> {
    match name.trim() {
        "" => Err(AuthError::InvalidName),
        trimmed => Ok(trimmed),
    }
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_garbage_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_name_is_trimmed() {
        assert_eq!(validate_name("  Ada ").unwrap(), "Ada");
        assert!(matches!(validate_name("   "), Err(AuthError::InvalidName)));
    }
}
