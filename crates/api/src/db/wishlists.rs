//! Wishlist repository.

use sqlx::PgPool;

use tradepost_core::{ProductId, UserId, WishlistId};

use super::RepositoryError;
use crate::models::catalog::ProductSummary;
use crate::models::wishlist::{Wishlist, WishlistView};

/// Repository for wishlist database operations.
pub struct WishlistRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WishlistRepository<'a> {
    /// Create a new wishlist repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's wishlist, created if missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Wishlist, RepositoryError> {
        sqlx::query(
            "INSERT INTO shop.wishlist (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(WishlistId::new())
        .bind(user_id)
        .execute(self.pool)
        .await?;

        let wishlist = sqlx::query_as::<_, Wishlist>(
            "SELECT id, user_id, created_at FROM shop.wishlist WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(wishlist)
    }

    /// The user's wishlist with product summaries, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn view(&self, user_id: UserId) -> Result<WishlistView, RepositoryError> {
        let wishlist = self.get_or_create(user_id).await?;

        let items = sqlx::query_as::<_, ProductSummary>(
            r"
            SELECT p.id, p.name, p.price, p.stock,
                   (SELECT url FROM shop.product_image i
                    WHERE i.product_id = p.id ORDER BY position LIMIT 1) AS image_url
            FROM shop.wishlist_item wi
            JOIN shop.product p ON p.id = wi.product_id
            WHERE wi.wishlist_id = $1
            ORDER BY wi.created_at DESC
            ",
        )
        .bind(wishlist.id)
        .fetch_all(self.pool)
        .await?;

        Ok(WishlistView { wishlist, items })
    }

    /// Add a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if it is already in the wishlist.
    pub async fn add(
        &self,
        wishlist_id: WishlistId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shop.wishlist_item (id, wishlist_id, product_id) VALUES ($1, $2, $3)",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(wishlist_id)
        .bind(product_id)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if RepositoryError::is_foreign_key_violation(&e) {
                RepositoryError::NotFound
            } else {
                RepositoryError::on_unique(e, "Item already in wishlist")
            }
        })?;
        Ok(())
    }

    /// Remove a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in the wishlist.
    pub async fn remove(
        &self,
        wishlist_id: WishlistId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM shop.wishlist_item WHERE wishlist_id = $1 AND product_id = $2")
                .bind(wishlist_id)
                .bind(product_id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove every product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, wishlist_id: WishlistId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.wishlist_item WHERE wishlist_id = $1")
            .bind(wishlist_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
