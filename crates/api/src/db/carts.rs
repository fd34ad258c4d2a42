//! Cart repository.
//!
//! Each user has exactly one cart, created on first use. Lines keep the
//! unit price seen when they were first added.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use tradepost_core::{CartId, CartItemId, Money, ProductId, UserId};

use super::RepositoryError;
use crate::models::cart::{Cart, CartItem, CartLine, CartView};
use crate::models::catalog::ProductSummary;

const ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, price, created_at";
const INSUFFICIENT_STOCK: &str = "Insufficient stock";

#[derive(sqlx::FromRow)]
struct LineRow {
    #[sqlx(flatten)]
    item: CartItem,
    product_name: String,
    product_price: Decimal,
    product_stock: i32,
    image_url: Option<String>,
}

impl From<LineRow> for CartLine {
    fn from(row: LineRow) -> Self {
        Self {
            product: ProductSummary {
                id: row.item.product_id,
                name: row.product_name,
                price: row.product_price,
                stock: row.product_stock,
                image_url: row.image_url,
            },
            item: row.item,
        }
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's cart, created if missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        sqlx::query("INSERT INTO shop.cart (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
            .bind(CartId::new())
            .bind(user_id)
            .execute(self.pool)
            .await?;

        let cart = sqlx::query_as::<_, Cart>(
            "SELECT id, user_id, created_at, updated_at FROM shop.cart WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(cart)
    }

    /// The user's cart with product details and total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, RepositoryError> {
        let cart = self.get_or_create(user_id).await?;

        let rows = sqlx::query_as::<_, LineRow>(
            r"
            SELECT ci.id, ci.cart_id, ci.product_id, ci.quantity, ci.price, ci.created_at,
                   p.name AS product_name, p.price AS product_price, p.stock AS product_stock,
                   (SELECT url FROM shop.product_image i
                    WHERE i.product_id = p.id ORDER BY position LIMIT 1) AS image_url
            FROM shop.cart_item ci
            JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.created_at
            ",
        )
        .bind(cart.id)
        .fetch_all(self.pool)
        .await?;

        let items: Vec<CartLine> = rows.into_iter().map(CartLine::from).collect();
        let total = line_total(items.iter().map(|l| (l.item.quantity, l.item.price)))?;

        Ok(CartView { cart, items, total })
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Invalid` if stock cannot cover the new quantity.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The product row is locked exclusively: a first add has no cart line
        // to lock yet, so concurrent adds of the same product queue up here.
        let (price, stock): (Decimal, i32) =
            sqlx::query_as("SELECT price, stock FROM shop.product WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        let existing: i32 = sqlx::query_scalar(
            "SELECT quantity FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        if i64::from(existing) + i64::from(quantity) > i64::from(stock) {
            return Err(RepositoryError::Invalid(INSUFFICIENT_STOCK.to_owned()));
        }

        let item = sqlx::query_as::<_, CartItem>(&format!(
            r"
            INSERT INTO shop.cart_item (id, cart_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cart_id, product_id)
            DO UPDATE SET quantity = shop.cart_item.quantity + EXCLUDED.quantity
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(CartItemId::new())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

        touch(&mut *tx, cart_id).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Set the quantity of a line in this cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in the cart.
    /// Returns `RepositoryError::Invalid` if stock cannot cover the quantity.
    pub async fn update_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let stock: i32 = sqlx::query_scalar(
            r"
            SELECT p.stock
            FROM shop.cart_item ci JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.id = $1 AND ci.cart_id = $2
            FOR UPDATE OF ci
            ",
        )
        .bind(item_id)
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if quantity > stock {
            return Err(RepositoryError::Invalid(INSUFFICIENT_STOCK.to_owned()));
        }

        let item = sqlx::query_as::<_, CartItem>(&format!(
            "UPDATE shop.cart_item SET quantity = $2 WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        touch(&mut *tx, cart_id).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Remove a line from this cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in the cart.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Sum of quantity times line price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total(&self, cart_id: CartId) -> Result<Decimal, RepositoryError> {
        let items = lines(&mut *self.pool.acquire().await?, cart_id).await?;
        line_total(items.iter().map(|i| (i.quantity, i.price)))
    }
}

/// Lines in a cart, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lines(conn: &mut PgConnection, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
    let items = sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM shop.cart_item WHERE cart_id = $1 ORDER BY created_at"
    ))
    .bind(cart_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Remove every line from a cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn clear(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    touch(conn, cart_id).await
}

async fn touch(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE shop.cart SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Sum `quantity * price` over cart lines.
pub(crate) fn line_total(
    lines: impl IntoIterator<Item = (i32, Decimal)>,
) -> Result<Decimal, RepositoryError> {
    Money::total_of(lines)
        .map(Money::amount)
        .map_err(|e| RepositoryError::DataCorruption(format!("cart total: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_line_total() {
        let lines = [
            (2, Decimal::from_str("19.99").unwrap()),
            (3, Decimal::from_str("1.50").unwrap()),
        ];
        assert_eq!(line_total(lines).unwrap(), Decimal::from_str("44.48").unwrap());
        assert_eq!(line_total(std::iter::empty()).unwrap(), Decimal::ZERO);
    }
}
