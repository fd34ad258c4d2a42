//! Product repository.
//!
//! Product writes touch several tables (images, size and color stock), so
//! they run in a single transaction.

use sqlx::{PgConnection, PgPool};

use tradepost_core::{Pagination, ProductId};

use super::RepositoryError;
use crate::models::catalog::{
    CategoryRef, NewProduct, Product, ProductDetail, ProductFilter, ProductImage, ProductListItem,
    ProductUpdate, VariantInput, VariantStock,
};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.price, p.stock, p.sku, \
     p.category_id, p.average_rating, p.created_at, p.updated_at";

const FIRST_IMAGE: &str = "(SELECT url FROM shop.product_image i \
     WHERE i.product_id = p.id ORDER BY position LIMIT 1) AS image_url";

const DUPLICATE_PRODUCT: &str = "A product with this name or SKU already exists";
const INVALID_REFERENCE: &str = "Invalid category, size, or color ID";

/// Map write failures to the messages clients see for product forms.
fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return RepositoryError::Invalid(DUPLICATE_PRODUCT.to_owned());
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::Invalid(INVALID_REFERENCE.to_owned());
        }
    }
    RepositoryError::Database(e)
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// List products, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        page: Pagination,
    ) -> Result<(Vec<ProductListItem>, i64), RepositoryError> {
        let page = page.normalized();
        let products = sqlx::query_as::<_, ProductListItem>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}, c.name AS category_name, {FIRST_IMAGE}
            FROM shop.product p
            JOIN shop.category c ON c.id = p.category_id
            ORDER BY p.created_at DESC
            OFFSET $1 LIMIT $2
            "
        ))
        .bind(page.skip)
        .bind(page.take)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.product")
            .fetch_one(self.pool)
            .await?;

        Ok((products, total))
    }

    /// Filtered, sorted product search with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(
        &self,
        filter: &ProductFilter,
        page: Pagination,
    ) -> Result<(Vec<ProductListItem>, i64), RepositoryError> {
        const FILTER: &str = r"
            FROM shop.product p
            JOIN shop.category c ON c.id = p.category_id
            WHERE ($1::text IS NULL OR strpos(LOWER(p.name), LOWER($1)) > 0)
              AND ($2::text IS NULL OR LOWER(c.name) = LOWER($2))
              AND p.price BETWEEN $3 AND $4
        ";

        let page = page.normalized();
        let products = sqlx::query_as::<_, ProductListItem>(&format!(
            "SELECT {PRODUCT_COLUMNS}, c.name AS category_name, {FIRST_IMAGE} {FILTER} \
             ORDER BY {} {}, p.id OFFSET $5 LIMIT $6",
            filter.order_by.as_sql(),
            filter.order.as_sql(),
        ))
        .bind(filter.name.as_deref())
        .bind(filter.category.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(page.skip)
        .bind(page.take)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {FILTER}"))
            .bind(filter.name.as_deref())
            .bind(filter.category.as_deref())
            .bind(filter.min_price)
            .bind(filter.max_price)
            .fetch_one(self.pool)
            .await?;

        Ok((products, total))
    }

    /// Most recently added products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn new_arrivals(&self, limit: i64) -> Result<Vec<ProductListItem>, RepositoryError> {
        let products = sqlx::query_as::<_, ProductListItem>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}, c.name AS category_name, {FIRST_IMAGE}
            FROM shop.product p
            JOIN shop.category c ON c.id = p.category_id
            ORDER BY p.created_at DESC
            LIMIT $1
            "
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Products at or below `threshold`, lowest stock first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn low_stock(&self, threshold: i32) -> Result<Vec<ProductListItem>, RepositoryError> {
        let products = sqlx::query_as::<_, ProductListItem>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}, c.name AS category_name, {FIRST_IMAGE}
            FROM shop.product p
            JOIN shop.category c ON c.id = p.category_id
            WHERE p.stock <= $1
            ORDER BY p.stock ASC, p.name
            "
        ))
        .bind(threshold)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Full product view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn detail(&self, id: ProductId) -> Result<ProductDetail, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut *conn, id).await
    }

    /// Create a product with its images and variant stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for duplicate names or unknown
    /// category, size or color ids.
    pub async fn create(&self, new: &NewProduct) -> Result<ProductDetail, RepositoryError> {
        let id = ProductId::new();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO shop.product (id, name, description, price, stock, sku, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.stock)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(new.category_id)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        replace_variants(&mut *tx, id, VariantTable::Size, &new.sizes).await?;
        replace_variants(&mut *tx, id, VariantTable::Color, &new.colors).await?;
        append_images(&mut *tx, id, &new.image_urls).await?;

        let detail = load_detail(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Update a product. Provided variant lists replace the existing ones;
    /// new images are appended.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Invalid` for duplicate names or unknown ids.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<ProductDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE shop.product
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                stock = COALESCE($5, stock),
                category_id = COALESCE($6, category_id),
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(update.stock)
        .bind(update.category_id)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        if let Some(sizes) = &update.sizes {
            replace_variants(&mut *tx, id, VariantTable::Size, sizes).await?;
        }
        if let Some(colors) = &update.colors {
            replace_variants(&mut *tx, id, VariantTable::Color, colors).await?;
        }
        append_images(&mut *tx, id, &update.image_urls).await?;

        let detail = load_detail(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if orders reference the product.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if RepositoryError::is_foreign_key_violation(&e) {
                    RepositoryError::Conflict(
                        "Product has been ordered and cannot be deleted".to_owned(),
                    )
                } else {
                    RepositoryError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum VariantTable {
    Size,
    Color,
}

impl VariantTable {
    const fn table(self) -> &'static str {
        match self {
            Self::Size => "shop.product_size",
            Self::Color => "shop.product_color",
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Size => "size_id",
            Self::Color => "color_id",
        }
    }
}

async fn replace_variants(
    conn: &mut PgConnection,
    product_id: ProductId,
    kind: VariantTable,
    variants: &[VariantInput],
) -> Result<(), RepositoryError> {
    let (table, column) = (kind.table(), kind.column());

    sqlx::query(&format!("DELETE FROM {table} WHERE product_id = $1"))
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    for variant in variants {
        if variant.stock < 0 {
            return Err(RepositoryError::Invalid(
                "Variant stock cannot be negative".to_owned(),
            ));
        }
        sqlx::query(&format!(
            "INSERT INTO {table} (product_id, {column}, stock) VALUES ($1, $2, $3)"
        ))
        .bind(product_id)
        .bind(variant.id)
        .bind(variant.stock)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Invalid("Duplicate size or color ID".to_owned());
            }
            map_write_error(e)
        })?;
    }
    Ok(())
}

async fn append_images(
    conn: &mut PgConnection,
    product_id: ProductId,
    urls: &[String],
) -> Result<(), RepositoryError> {
    if urls.is_empty() {
        return Ok(());
    }

    let next: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM shop.product_image WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    for (position, url) in (next..).zip(urls) {
        sqlx::query(
            "INSERT INTO shop.product_image (id, product_id, url, position) VALUES ($1, $2, $3, $4)",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(product_id)
        .bind(url)
        .bind(position)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_detail(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<ProductDetail, RepositoryError> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM shop.product p WHERE p.id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    let category =
        sqlx::query_as::<_, CategoryRef>("SELECT id, name FROM shop.category WHERE id = $1")
            .bind(product.category_id)
            .fetch_one(&mut *conn)
            .await?;

    let images = sqlx::query_as::<_, ProductImage>(
        "SELECT url, position FROM shop.product_image WHERE product_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let sizes = sqlx::query_as::<_, VariantStock>(
        r"
        SELECT s.id, s.name, ps.stock
        FROM shop.product_size ps JOIN shop.size s ON s.id = ps.size_id
        WHERE ps.product_id = $1
        ORDER BY s.name
        ",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let colors = sqlx::query_as::<_, VariantStock>(
        r"
        SELECT c.id, c.name, pc.stock
        FROM shop.product_color pc JOIN shop.color c ON c.id = pc.color_id
        WHERE pc.product_id = $1
        ORDER BY c.name
        ",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ProductDetail {
        product,
        category,
        images,
        sizes,
        colors,
    })
}
