//! Order repository.
//!
//! Orders are only created by checkout fulfilment (see [`insert`]); admins
//! move them through the status lifecycle afterwards.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use tradepost_core::{
    AddressId, OrderId, OrderItemId, OrderStatus, Pagination, ProductId, SortOrder, UserId,
};

use super::RepositoryError;
use super::outbox;
use crate::models::catalog::ProductSummary;
use crate::models::order::{Order, OrderDetail, OrderItem, OrderLine, OrderSortField};
use crate::models::outbox::{OrderStatusChanged, OutboxMessage};

const ORDER_COLUMNS: &str = "id, user_id, shipping_address_id, status, total, payment_reference, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct LineRow {
    #[sqlx(flatten)]
    item: OrderItem,
    product_name: String,
    product_price: Decimal,
    product_stock: i32,
    image_url: Option<String>,
}

impl From<LineRow> for OrderLine {
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

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }

    /// An order with its lines and shipping address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn detail(&self, id: OrderId) -> Result<OrderDetail, RepositoryError> {
        let order = self.get(id).await?.ok_or(RepositoryError::NotFound)?;

        let shipping_address = match order.shipping_address_id {
            Some(address_id) => {
                super::AddressRepository::new(self.pool)
                    .get(address_id)
                    .await?
            }
            None => None,
        };

        let mut lines = self.lines_for(&[order.id]).await?;
        let items = lines.remove(&order.id).unwrap_or_default();

        Ok(OrderDetail {
            order,
            items,
            shipping_address,
        })
    }

    /// All orders for the admin list, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        page: Pagination,
        order_by: OrderSortField,
        order: SortOrder,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let page = page.normalized();
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order ORDER BY {} {}, id OFFSET $1 LIMIT $2",
            order_by.as_sql(),
            order.as_sql(),
        ))
        .bind(page.skip)
        .bind(page.take)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.order")
            .fetch_one(self.pool)
            .await?;

        Ok((orders, total))
    }

    /// A user's orders, newest first, with lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<OrderDetail>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let mut lines = self.lines_for(&ids).await?;

        Ok(orders
            .into_iter()
            .map(|order| OrderDetail {
                items: lines.remove(&order.id).unwrap_or_default(),
                shipping_address: None,
                order,
            })
            .collect())
    }

    /// Move an order to `next` and queue the customer notification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Invalid` if the lifecycle forbids the move.
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: OrderStatus =
            sqlx::query_scalar("SELECT status FROM shop.order WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        current
            .transition_to(next)
            .map_err(|e| RepositoryError::Invalid(format!("Invalid status transition: {e}")))?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE shop.order SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        outbox::enqueue(
            &mut *tx,
            &OutboxMessage::OrderStatusChanged(OrderStatusChanged {
                order_id: order.id,
                user_id: order.user_id,
                status: next,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn lines_for(
        &self,
        order_ids: &[OrderId],
    ) -> Result<HashMap<OrderId, Vec<OrderLine>>, RepositoryError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, LineRow>(
            r"
            SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price,
                   p.name AS product_name, p.price AS product_price, p.stock AS product_stock,
                   (SELECT url FROM shop.product_image i
                    WHERE i.product_id = p.id ORDER BY position LIMIT 1) AS image_url
            FROM shop.order_item oi
            JOIN shop.product p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY p.name
            ",
        )
        .bind(order_ids)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.item.order_id)
                .or_default()
                .push(OrderLine::from(row));
        }
        Ok(grouped)
    }
}

/// Insert a paid order and its lines in the caller's transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if an order already exists for the
/// payment reference.
pub async fn insert(
    conn: &mut PgConnection,
    user_id: UserId,
    shipping_address_id: Option<AddressId>,
    payment_reference: &str,
    total: Decimal,
    lines: &[(ProductId, i32, Decimal)],
) -> Result<Order, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        r"
        INSERT INTO shop.order (id, user_id, shipping_address_id, status, total, payment_reference)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(OrderId::new())
    .bind(user_id)
    .bind(shipping_address_id)
    .bind(OrderStatus::Paid)
    .bind(total)
    .bind(payment_reference)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::on_unique(e, "Order already exists for this payment"))?;

    for (product_id, quantity, price) in lines {
        sqlx::query(
            r"
            INSERT INTO shop.order_item (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(OrderItemId::new())
        .bind(order.id)
        .bind(product_id)
        .bind(quantity)
        .bind(price)
        .execute(&mut *conn)
        .await?;
    }

    Ok(order)
}
