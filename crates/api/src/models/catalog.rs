//! Catalog models: categories, products, sizes and colors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_core::{CategoryId, ColorId, ProductId, SizeId};

/// Category row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal category reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
}

/// Category with its parent and direct children.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub parent: Option<CategoryRef>,
    pub children: Vec<CategoryRef>,
}

/// Category detail including the products filed under it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub node: CategoryNode,
    pub products: Vec<ProductSummary>,
}

/// A size or color option.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Size {
    pub id: SizeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A color option.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Color {
    pub id: ColorId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Product row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub sku: String,
    pub category_id: CategoryId,
    pub average_rating: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product as shown in listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub category_name: String,
    pub image_url: Option<String>,
}

/// Product reference embedded in carts, orders and wishlists.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
}

/// Product image.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductImage {
    pub url: String,
    pub position: i32,
}

/// Stock held for one size or color of a product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VariantStock {
    pub id: uuid::Uuid,
    pub name: String,
    pub stock: i32,
}

/// Full product view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: CategoryRef,
    pub images: Vec<ProductImage>,
    pub sizes: Vec<VariantStock>,
    pub colors: Vec<VariantStock>,
}

/// Size or color assignment sent with product writes (`[{"id","stock"}]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VariantInput {
    pub id: uuid::Uuid,
    pub stock: i32,
}

/// Validated fields for a new product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: CategoryId,
    pub sizes: Vec<VariantInput>,
    pub colors: Vec<VariantInput>,
    pub image_urls: Vec<String>,
}

/// Validated fields for a product update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category_id: Option<CategoryId>,
    pub sizes: Option<Vec<VariantInput>>,
    pub colors: Option<Vec<VariantInput>>,
    pub image_urls: Vec<String>,
}

/// Columns `GET /products/search` can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ProductSortField {
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "name")]
    Name,
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
}

impl ProductSortField {
    /// Qualified column for ORDER BY.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Price => "p.price",
            Self::Name => "p.name",
            Self::CreatedAt => "p.created_at",
        }
    }
}

/// Search filters after defaults are applied.
#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub order_by: ProductSortField,
    pub order: tradepost_core::SortOrder,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_parsing() {
        let field: ProductSortField = serde_json::from_str("\"createdAt\"").unwrap();
        assert_eq!(field, ProductSortField::CreatedAt);
        assert_eq!(ProductSortField::Price.as_sql(), "p.price");
        assert!(serde_json::from_str::<ProductSortField>("\"stock\"").is_err());
    }

    #[test]
    fn test_variant_input_parsing() {
        let parsed: Vec<VariantInput> = serde_json::from_str(
            r#"[{"id":"6f1c1b7e-8a4e-4a53-9d0b-1a3c5e7f9b21","stock":4}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.first().unwrap().stock, 4);
    }
}
