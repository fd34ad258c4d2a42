//! Order models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_core::{AddressId, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::address::ShippingAddress;
use super::catalog::ProductSummary;

/// Order row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub shipping_address_id: Option<AddressId>,
    pub status: OrderStatus,
    pub total: Decimal,
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order line row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Decimal,
}

/// Order line with its product.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: ProductSummary,
}

/// Order with lines and (when still on file) its shipping address.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLine>,
    pub shipping_address: Option<ShippingAddress>,
}

/// Columns the admin order list can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OrderSortField {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "total")]
    Total,
    #[serde(rename = "status")]
    Status,
}

impl OrderSortField {
    /// Column for ORDER BY.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Total => "total",
            Self::Status => "status",
        }
    }
}
