//! User account model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tradepost_core::{Email, Role, UserId};

/// A store account. The password hash never leaves the repository.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal user reference embedded in other responses.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}
