//! Wishlist models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tradepost_core::{UserId, WishlistId};

use super::catalog::ProductSummary;

/// Wishlist row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    pub id: WishlistId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Wishlist with its products.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistView {
    #[serde(flatten)]
    pub wishlist: Wishlist,
    pub items: Vec<ProductSummary>,
}
