//! Review models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tradepost_core::{ProductId, ReviewId, UserId};

use super::user::UserRef;

/// Review row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review joined with author and product names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    #[sqlx(flatten)]
    pub review: Review,
    pub user_name: String,
    pub product_name: String,
}

/// Product reference embedded in a review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewedProduct {
    pub id: ProductId,
    pub name: String,
}

/// Review as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDetail {
    #[serde(flatten)]
    pub review: Review,
    pub user: UserRef,
    pub product: ReviewedProduct,
}

impl From<ReviewRow> for ReviewDetail {
    fn from(row: ReviewRow) -> Self {
        Self {
            user: UserRef {
                id: row.review.user_id,
                name: row.user_name,
            },
            product: ReviewedProduct {
                id: row.review.product_id,
                name: row.product_name,
            },
            review: row.review,
        }
    }
}
