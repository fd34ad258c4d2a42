//! Size and color reference lists.

use sqlx::PgPool;

use tradepost_core::{ColorId, SizeId};

use super::RepositoryError;
use crate::models::catalog::{Color, Size};

/// Repository for size and color options.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All sizes, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sizes(&self) -> Result<Vec<Size>, RepositoryError> {
        let sizes =
            sqlx::query_as::<_, Size>("SELECT id, name, created_at FROM shop.size ORDER BY name")
                .fetch_all(self.pool)
                .await?;
        Ok(sizes)
    }

    /// Add a size.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_size(&self, name: &str) -> Result<Size, RepositoryError> {
        sqlx::query_as::<_, Size>(
            "INSERT INTO shop.size (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(SizeId::new())
        .bind(name)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::on_unique(e, "Size already exists"))
    }

    /// All colors, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn colors(&self) -> Result<Vec<Color>, RepositoryError> {
        let colors =
            sqlx::query_as::<_, Color>("SELECT id, name, created_at FROM shop.color ORDER BY name")
                .fetch_all(self.pool)
                .await?;
        Ok(colors)
    }

    /// Add a color.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_color(&self, name: &str) -> Result<Color, RepositoryError> {
        sqlx::query_as::<_, Color>(
            "INSERT INTO shop.color (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(ColorId::new())
        .bind(name)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::on_unique(e, "Color already exists"))
    }
}
