//! Cached size and color lists.
//!
//! Sizes and colors change rarely and are read on every product form, so
//! they are cached for 5 minutes and invalidated whenever one is added.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tracing::debug;

use crate::db::{CatalogRepository, RepositoryError};
use crate::models::catalog::{Color, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    Sizes,
    Colors,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Sizes(Arc<Vec<Size>>),
    Colors(Arc<Vec<Color>>),
}

/// Read-through cache over [`CatalogRepository`].
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(8)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { cache }
    }

    /// All sizes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the list has to be loaded and the query fails.
    pub async fn sizes(&self, pool: &PgPool) -> Result<Arc<Vec<Size>>, RepositoryError> {
        if let Some(CacheValue::Sizes(sizes)) = self.cache.get(&CacheKey::Sizes).await {
            debug!("Size list cache hit");
            return Ok(sizes);
        }

        let sizes = Arc::new(CatalogRepository::new(pool).sizes().await?);
        self.cache
            .insert(CacheKey::Sizes, CacheValue::Sizes(Arc::clone(&sizes)))
            .await;
        Ok(sizes)
    }

    /// All colors.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the list has to be loaded and the query fails.
    pub async fn colors(&self, pool: &PgPool) -> Result<Arc<Vec<Color>>, RepositoryError> {
        if let Some(CacheValue::Colors(colors)) = self.cache.get(&CacheKey::Colors).await {
            debug!("Color list cache hit");
            return Ok(colors);
        }

        let colors = Arc::new(CatalogRepository::new(pool).colors().await?);
        self.cache
            .insert(CacheKey::Colors, CacheValue::Colors(Arc::clone(&colors)))
            .await;
        Ok(colors)
    }

    /// Add a size and drop the cached list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_size(&self, pool: &PgPool, name: &str) -> Result<Size, RepositoryError> {
        let size = CatalogRepository::new(pool).create_size(name).await?;
        self.cache.invalidate(&CacheKey::Sizes).await;
        Ok(size)
    }

    /// Add a color and drop the cached list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_color(&self, pool: &PgPool, name: &str) -> Result<Color, RepositoryError> {
        let color = CatalogRepository::new(pool).create_color(name).await?;
        self.cache.invalidate(&CacheKey::Colors).await;
        Ok(color)
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}
