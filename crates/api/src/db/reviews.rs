//! Review repository.
//!
//! Every write recomputes the product's `average_rating` in the same
//! transaction.

use sqlx::{PgConnection, PgPool};

use tradepost_core::{OrderStatus, Pagination, ProductId, ReviewId, UserId};

use super::RepositoryError;
use crate::models::review::{Review, ReviewDetail, ReviewRow};

const REVIEW_COLUMNS: &str =
    "r.id, r.user_id, r.product_id, r.rating, r.comment, r.created_at, r.updated_at";

const REVIEW_JOIN: &str = "FROM shop.review r \
     JOIN shop.user u ON u.id = r.user_id \
     JOIN shop.product p ON p.id = r.product_id";

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a review with author and product names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ReviewId) -> Result<Option<ReviewDetail>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}, u.name AS user_name, p.name AS product_name \
             {REVIEW_JOIN} WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(ReviewDetail::from))
    }

    /// Reviews, newest first, optionally for one product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        product_id: Option<ProductId>,
        page: Pagination,
    ) -> Result<(Vec<ReviewDetail>, i64), RepositoryError> {
        let page = page.normalized();
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}, u.name AS user_name, p.name AS product_name \
             {REVIEW_JOIN} WHERE ($1::uuid IS NULL OR r.product_id = $1) \
             ORDER BY r.created_at DESC OFFSET $2 LIMIT $3"
        ))
        .bind(product_id)
        .bind(page.skip)
        .bind(page.take)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shop.review WHERE ($1::uuid IS NULL OR product_id = $1)",
        )
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;

        Ok((rows.into_iter().map(ReviewDetail::from).collect(), total))
    }

    /// Create a review from a verified buyer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Invalid` if the user has no delivered order
    /// for the product or has already reviewed it.
    pub async fn create(
        &self,
        user_id: UserId,
        product_id: ProductId,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shop.product WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&mut *tx)
                .await?;
        if !product_exists {
            return Err(RepositoryError::NotFound);
        }

        let purchased: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM shop.order o
                JOIN shop.order_item oi ON oi.order_id = o.id
                WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = $3
            )
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(OrderStatus::Delivered)
        .fetch_one(&mut *tx)
        .await?;
        if !purchased {
            return Err(RepositoryError::Invalid(
                "You can only review products from delivered orders".to_owned(),
            ));
        }

        let review = sqlx::query_as::<_, Review>(
            r"
            INSERT INTO shop.review (id, user_id, product_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, product_id, rating, comment, created_at, updated_at
            ",
        )
        .bind(ReviewId::new())
        .bind(user_id)
        .bind(product_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Invalid(
                    "You have already reviewed this product".to_owned(),
                );
            }
            RepositoryError::Database(e)
        })?;

        refresh_average(&mut *tx, product_id).await?;
        tx.commit().await?;
        Ok(review)
    }

    /// Change rating and/or comment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    pub async fn update(
        &self,
        id: ReviewId,
        rating: Option<i16>,
        comment: Option<&str>,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let review = sqlx::query_as::<_, Review>(
            r"
            UPDATE shop.review
            SET rating = COALESCE($2, rating),
                comment = COALESCE($3, comment),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, product_id, rating, comment, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(rating)
        .bind(comment)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        refresh_average(&mut *tx, review.product_id).await?;
        tx.commit().await?;
        Ok(review)
    }

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product_id: ProductId =
            sqlx::query_scalar("DELETE FROM shop.review WHERE id = $1 RETURNING product_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        refresh_average(&mut *tx, product_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Recompute a product's average rating; zero once no reviews remain.
async fn refresh_average(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.product
        SET average_rating = COALESCE(
                (SELECT ROUND(AVG(rating)::numeric, 2) FROM shop.review WHERE product_id = $1),
                0)
        WHERE id = $1
        ",
    )
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}
