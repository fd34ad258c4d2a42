//! Admin reporting queries.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use tradepost_core::{DateRange, OrderStatus, ProductId, Role};

use super::RepositoryError;

/// Labels of the statuses whose orders count as sales.
fn revenue_statuses() -> Vec<String> {
    OrderStatus::ALL
        .into_iter()
        .filter(|s| s.counts_as_revenue())
        .map(|s| s.to_string())
        .collect()
}

/// Sales total over a window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalSales {
    pub total_sales: Decimal,
    #[serde(flatten)]
    pub range: DateRange,
}

/// One row of the best-seller report.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

/// Order count for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// New customers in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCustomers {
    /// `YYYY-MM`.
    pub month: String,
    pub customer_count: i64,
}

/// Headline store counts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_customers: i64,
    pub total_products: i64,
    pub total_orders: i64,
}

/// Repository for analytics queries.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    /// Create a new analytics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Sum of order totals in the window, revenue statuses only.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total_sales(&self, range: DateRange) -> Result<TotalSales, RepositoryError> {
        let total_sales: Decimal = sqlx::query_scalar(
            r"
            SELECT COALESCE(SUM(total), 0)
            FROM shop.order
            WHERE status::text = ANY($1) AND created_at BETWEEN $2 AND $3
            ",
        )
        .bind(revenue_statuses())
        .bind(range.start_date)
        .bind(range.end_date)
        .fetch_one(self.pool)
        .await?;

        Ok(TotalSales { total_sales, range })
    }

    /// Products by units sold, best first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_selling(&self, limit: i64) -> Result<Vec<TopProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopProduct>(
            r"
            SELECT p.id AS product_id, p.name,
                   SUM(oi.quantity)::bigint AS total_quantity,
                   SUM(oi.quantity * oi.price) AS total_revenue
            FROM shop.order_item oi
            JOIN shop.product p ON p.id = oi.product_id
            GROUP BY p.id, p.name
            ORDER BY total_quantity DESC, p.name
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Order count for every status, including those with none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn orders_by_status(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM shop.order GROUP BY status")
                .fetch_all(self.pool)
                .await?;
        Ok(fill_statuses(rows))
    }

    /// Customer sign-ups per month in the window, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn customer_growth(
        &self,
        range: DateRange,
    ) -> Result<Vec<MonthlyCustomers>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlyCustomers>(
            r"
            SELECT to_char(date_trunc('month', created_at AT TIME ZONE 'UTC'), 'YYYY-MM') AS month,
                   COUNT(*) AS customer_count
            FROM shop.user
            WHERE role = $1 AND created_at BETWEEN $2 AND $3
            GROUP BY 1
            ORDER BY 1
            ",
        )
        .bind(Role::User)
        .bind(range.start_date)
        .bind(range.end_date)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Customer, product and order counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self) -> Result<Summary, RepositoryError> {
        let summary = sqlx::query_as::<_, Summary>(
            r"
            SELECT
                (SELECT COUNT(*) FROM shop.user WHERE role = $1) AS total_customers,
                (SELECT COUNT(*) FROM shop.product) AS total_products,
                (SELECT COUNT(*) FROM shop.order) AS total_orders
            ",
        )
        .bind(Role::User)
        .fetch_one(self.pool)
        .await?;
        Ok(summary)
    }
}

/// One entry per status in lifecycle order, zero where the query had no row.
fn fill_statuses(rows: Vec<(OrderStatus, i64)>) -> Vec<StatusCount> {
    let counts: HashMap<OrderStatus, i64> = rows.into_iter().collect();
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: counts.get(&status).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_statuses_includes_zeroes() {
        let filled = fill_statuses(vec![(OrderStatus::Shipped, 4), (OrderStatus::Paid, 2)]);
        assert_eq!(filled.len(), OrderStatus::ALL.len());
        assert_eq!(filled[0], StatusCount { status: OrderStatus::Pending, count: 0 });
        assert_eq!(filled[1], StatusCount { status: OrderStatus::Paid, count: 2 });
        assert_eq!(filled[3], StatusCount { status: OrderStatus::Shipped, count: 4 });
        assert_eq!(filled[5].count, 0);
    }

    #[test]
    fn test_revenue_statuses_exclude_pending_and_cancelled() {
        let statuses = revenue_statuses();
        assert!(!statuses.contains(&"PENDING".to_owned()));
        assert!(!statuses.contains(&"CANCELLED".to_owned()));
        assert_eq!(statuses.len(), 4);
    }
}
