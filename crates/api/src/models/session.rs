//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use tradepost_core::{Email, Role, UserId};

use super::user::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role at login time.
    pub role: Role,
}

impl CurrentUser {
    /// Whether this user may use admin endpoints.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether this user may act on resources owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.id == owner || self.is_admin()
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for Google OAuth state (CSRF protection).
    pub const GOOGLE_OAUTH_STATE: &str = "google_oauth_state";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: UserId::new(),
            email: Email::parse("shopper@example.com").unwrap(),
            name: "Shopper".to_string(),
            role,
        }
    }

    #[test]
    fn test_owner_can_access() {
        let current = user(Role::User);
        assert!(current.can_access(current.id));
        assert!(!current.can_access(UserId::new()));
    }

    #[test]
    fn test_admin_can_access_anything() {
        let admin = user(Role::Admin);
        assert!(admin.can_access(UserId::new()));
    }

    #[test]
    fn test_session_round_trip_shape() {
        let current = user(Role::Admin);
        let json = serde_json::to_value(&current).unwrap();
        assert_eq!(json["role"], "ADMIN");
        let back: CurrentUser = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, current.id);
    }
}
