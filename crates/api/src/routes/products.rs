//! Product route handlers.
//!
//! Product writes are `multipart/form-data`: text fields plus zero or more
//! `images` file parts. Images are written to disk before the database
//! write and referenced by URL.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_core::{CategoryId, Pagination, ProductId, SortOrder};

use crate::db::{ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireAdmin;
use crate::models::catalog::{
    Color, NewProduct, ProductDetail, ProductFilter, ProductListItem, ProductSortField,
    ProductUpdate, Size, VariantInput,
};
use crate::services::uploads::{MAX_IMAGE_BYTES, UploadError};
use crate::state::AppState;

/// Default and largest `limit` for new arrivals.
const NEW_ARRIVALS_DEFAULT: i64 = 10;
const NEW_ARRIVALS_MAX: i64 = 50;

/// Room for several full-size images plus the text fields.
const PRODUCT_FORM_LIMIT: usize = 10 * MAX_IMAGE_BYTES + 64 * 1024;

/// Build the `/products` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list)
                .post(create)
                .layer(DefaultBodyLimit::max(PRODUCT_FORM_LIMIT)),
        )
        .route("/search", get(search))
        .route("/new-arrivals", get(new_arrivals))
        .route("/low-stock", get(low_stock))
        .route("/sizes", post(create_size).get(list_sizes))
        .route("/colors", post(create_color).get(list_colors))
        .route(
            "/{id}",
            get(show)
                .patch(update)
                .delete(remove)
                .layer(DefaultBodyLimit::max(PRODUCT_FORM_LIMIT)),
        )
}

/// A page of products.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<ProductListItem>,
    pub total: i64,
}

/// `GET /products/search` parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub order_by: ProductSortField,
    #[serde(default)]
    pub order: SortOrder,
}

const fn default_take() -> i64 {
    Pagination::DEFAULT_TAKE
}

impl SearchQuery {
    /// Apply defaults (price range 1..=100000) and reject an inverted range.
    fn into_filter(self) -> Result<(ProductFilter, Pagination)> {
        let min_price = self.min_price.unwrap_or(Decimal::ONE);
        let max_price = self.max_price.unwrap_or_else(|| Decimal::from(100_000));
        if min_price > max_price {
            return Err(AppError::BadRequest(
                "minPrice cannot be greater than maxPrice".to_string(),
            ));
        }

        let non_blank = |s: Option<String>| s.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let filter = ProductFilter {
            name: non_blank(self.name),
            category: non_blank(self.category),
            min_price,
            max_price,
            order_by: self.order_by,
            order: self.order,
        };
        let page = Pagination {
            skip: self.skip,
            take: self.take,
        };
        Ok((filter, page.normalized()))
    }
}

/// `?limit=` for new arrivals.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Size or color creation body.
#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

fn product_not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound("Product not found".to_string()),
        other => other.into(),
    }
}

/// `GET /products`
///
/// # Errors
///
/// 500 on database failure.
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<ProductPage>> {
    let (products, total) = ProductRepository::new(state.pool()).list(page).await?;
    Ok(Json(ProductPage { products, total }))
}

/// `GET /products/search`
///
/// # Errors
///
/// 400 on an unknown sort field/direction or inverted price range.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ProductPage>> {
    let (filter, page) = query.into_filter()?;
    let (products, total) = ProductRepository::new(state.pool())
        .search(&filter, page)
        .await?;
    Ok(Json(ProductPage { products, total }))
}

/// `GET /products/new-arrivals`
///
/// # Errors
///
/// 500 on database failure.
pub async fn new_arrivals(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ProductListItem>>> {
    let limit = query
        .limit
        .unwrap_or(NEW_ARRIVALS_DEFAULT)
        .clamp(1, NEW_ARRIVALS_MAX);
    Ok(Json(
        ProductRepository::new(state.pool())
            .new_arrivals(limit)
            .await?,
    ))
}

/// `GET /products/low-stock` (admin)
///
/// # Errors
///
/// 500 on database failure.
pub async fn low_stock(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<ProductListItem>>> {
    let threshold = state.config().low_stock_threshold;
    Ok(Json(
        ProductRepository::new(state.pool())
            .low_stock(threshold)
            .await?,
    ))
}

/// `GET /products/{id}`
///
/// # Errors
///
/// 404 if missing.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let detail = ProductRepository::new(state.pool())
        .detail(id)
        .await
        .map_err(product_not_found)?;
    Ok(Json(detail))
}

/// `POST /products` (admin, multipart)
///
/// # Errors
///
/// 400 on invalid fields or files, duplicate names, or unknown ids.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductDetail>)> {
    let form = ProductForm::read(multipart).await?;
    let mut new = form.new_product()?;
    new.image_urls = save_images(&state, &form.images).await?;

    let detail = match ProductRepository::new(state.pool()).create(&new).await {
        Ok(detail) => detail,
        Err(e) => {
            state.images().discard(&new.image_urls).await;
            return Err(e.into());
        }
    };
    tracing::info!(admin_id = %admin.id, product_id = %detail.product.id, "Product created");
    Ok((StatusCode::CREATED, Json(detail)))
}

/// `PATCH /products/{id}` (admin, multipart)
///
/// # Errors
///
/// 400 on invalid fields or files, 404 if missing.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Result<Json<ProductDetail>> {
    let form = ProductForm::read(multipart).await?;
    let mut update = form.to_update()?;

    let repo = ProductRepository::new(state.pool());
    if repo.get(id).await?.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    update.image_urls = save_images(&state, &form.images).await?;
    let detail = match repo.update(id, &update).await {
        Ok(detail) => detail,
        Err(e) => {
            state.images().discard(&update.image_urls).await;
            return Err(product_not_found(e));
        }
    };
    tracing::info!(admin_id = %admin.id, product_id = %id, "Product updated");
    Ok(Json(detail))
}

/// `DELETE /products/{id}` (admin)
///
/// # Errors
///
/// 404 if missing, 409 if the product has been ordered.
pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(product_not_found)?;
    tracing::info!(admin_id = %admin.id, product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /products/sizes` (admin)
///
/// # Errors
///
/// 400 on an empty name, 409 on a duplicate.
pub async fn create_size(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<NameRequest>,
) -> Result<(StatusCode, Json<Size>)> {
    let name = option_name(&body.name)?;
    let size = state.catalog().create_size(state.pool(), name).await?;
    Ok((StatusCode::CREATED, Json(size)))
}

/// `GET /products/sizes`
///
/// # Errors
///
/// 500 on database failure.
pub async fn list_sizes(State(state): State<AppState>) -> Result<Json<Arc<Vec<Size>>>> {
    Ok(Json(state.catalog().sizes(state.pool()).await?))
}

/// `POST /products/colors` (admin)
///
/// # Errors
///
/// 400 on an empty name, 409 on a duplicate.
pub async fn create_color(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<NameRequest>,
) -> Result<(StatusCode, Json<Color>)> {
    let name = option_name(&body.name)?;
    let color = state.catalog().create_color(state.pool(), name).await?;
    Ok((StatusCode::CREATED, Json(color)))
}

/// `GET /products/colors`
///
/// # Errors
///
/// 500 on database failure.
pub async fn list_colors(State(state): State<AppState>) -> Result<Json<Arc<Vec<Color>>>> {
    Ok(Json(state.catalog().colors(state.pool()).await?))
}

fn option_name(name: &str) -> Result<&str> {
    match name.trim() {
        "" => Err(AppError::BadRequest("Name cannot be empty".to_string())),
        trimmed => Ok(trimmed),
    }
}

// =============================================================================
// Multipart form
// =============================================================================

/// An uploaded file part.
#[derive(Debug)]
struct ImagePart {
    content_type: String,
    bytes: axum::body::Bytes,
}

/// Raw product form fields, all optional until validated.
#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    price: Option<String>,
    stock: Option<String>,
    category_id: Option<String>,
    sizes: Option<String>,
    colors: Option<String>,
    images: Vec<ImagePart>,
}

impl ProductForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(UploadError::from)? {
            let name = field.name().unwrap_or_default().to_owned();
            if name == "images" {
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(UploadError::from)?;
                form.images.push(ImagePart {
                    content_type,
                    bytes,
                });
                continue;
            }

            let value = field.text().await.map_err(UploadError::from)?;
            let slot = match name.as_str() {
                "name" => &mut form.name,
                "description" => &mut form.description,
                "price" => &mut form.price,
                "stock" => &mut form.stock,
                "categoryId" => &mut form.category_id,
                "sizes" => &mut form.sizes,
                "colors" => &mut form.colors,
                other => {
                    tracing::debug!(field = %other, "Ignoring unknown product form field");
                    continue;
                }
            };
            *slot = Some(value);
        }
        Ok(form)
    }

    fn new_product(&self) -> Result<NewProduct> {
        fn required<'f>(field: &'f Option<String>, label: &str) -> Result<&'f str> {
            field
                .as_deref()
                .ok_or_else(|| AppError::BadRequest(format!("{label} is required")))
        }

        Ok(NewProduct {
            name: parse_name(required(&self.name, "name")?)?,
            description: required(&self.description, "description")?.trim().to_owned(),
            price: parse_price(required(&self.price, "price")?)?,
            stock: parse_stock(required(&self.stock, "stock")?)?,
            category_id: parse_category(required(&self.category_id, "categoryId")?)?,
            sizes: self.sizes.as_deref().map(parse_variants).transpose()?.unwrap_or_default(),
            colors: self.colors.as_deref().map(parse_variants).transpose()?.unwrap_or_default(),
            image_urls: Vec::new(),
        })
    }

    fn to_update(&self) -> Result<ProductUpdate> {
        Ok(ProductUpdate {
            name: self.name.as_deref().map(parse_name).transpose()?,
            description: self.description.as_deref().map(|d| d.trim().to_owned()),
            price: self.price.as_deref().map(parse_price).transpose()?,
            stock: self.stock.as_deref().map(parse_stock).transpose()?,
            category_id: self.category_id.as_deref().map(parse_category).transpose()?,
            sizes: self.sizes.as_deref().map(parse_variants).transpose()?,
            colors: self.colors.as_deref().map(parse_variants).transpose()?,
            image_urls: Vec::new(),
        })
    }
}

/// Save every image, or none: a failure deletes the ones already written.
async fn save_images(state: &AppState, images: &[ImagePart]) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(images.len());
    for image in images {
        match state.images().save(&image.content_type, &image.bytes).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                state.images().discard(&urls).await;
                return Err(e.into());
            }
        }
    }
    Ok(urls)
}

fn parse_name(raw: &str) -> Result<String> {
    match raw.trim() {
        "" => Err(AppError::BadRequest("name cannot be empty".to_string())),
        trimmed => Ok(trimmed.to_owned()),
    }
}

fn parse_price(raw: &str) -> Result<Decimal> {
    let price = Decimal::from_str(raw.trim())
        .map_err(|_| AppError::BadRequest("price must be a decimal number".to_string()))?;
    if price <= Decimal::ZERO {
        return Err(AppError::BadRequest("price must be greater than 0".to_string()));
    }
    Ok(price.round_dp(2))
}

fn parse_stock(raw: &str) -> Result<i32> {
    match raw.trim().parse::<i32>() {
        Ok(stock) if stock >= 0 => Ok(stock),
        _ => Err(AppError::BadRequest(
            "stock must be a non-negative integer".to_string(),
        )),
    }
}

fn parse_category(raw: &str) -> Result<CategoryId> {
    CategoryId::from_str(raw.trim())
        .map_err(|_| AppError::BadRequest("Invalid category, size, or color ID".to_string()))
}

fn parse_variants(raw: &str) -> Result<Vec<VariantInput>> {
    let variants: Vec<VariantInput> = serde_json::from_str(raw).map_err(|_| {
        AppError::BadRequest("sizes and colors must be JSON [{\"id\",\"stock\"}]".to_string())
    })?;
    if variants.iter().any(|v| v.stock < 0) {
        return Err(AppError::BadRequest(
            "variant stock must be a non-negative integer".to_string(),
        ));
    }
    Ok(variants)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::extract::rejection::QueryRejection;

    use super::*;

    fn search(qs: &str) -> std::result::Result<SearchQuery, QueryRejection> {
        let uri: axum::http::Uri = format!("/api/v2/products/search?{qs}").parse().unwrap();
        axum::extract::Query::try_from_uri(&uri).map(|axum::extract::Query(q)| q)
    }

    #[test]
    fn test_search_defaults() {
        let (filter, page) = search("").unwrap().into_filter().unwrap();
        assert_eq!(filter.min_price, Decimal::ONE);
        assert_eq!(filter.max_price, Decimal::from(100_000));
        assert_eq!(filter.order_by, ProductSortField::CreatedAt);
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(page, Pagination::default());
    }

    #[test]
    fn test_search_parses_camel_case() {
        let (filter, page) = search("name=%20shirt%20&minPrice=10.5&orderBy=price&order=asc&take=500")
            .unwrap()
            .into_filter()
            .unwrap();
        assert_eq!(filter.name.as_deref(), Some("shirt"));
        assert_eq!(filter.min_price, Decimal::from_str("10.5").unwrap());
        assert_eq!(filter.order_by, ProductSortField::Price);
        assert_eq!(filter.order, SortOrder::Asc);
        assert_eq!(page.take, Pagination::MAX_TAKE);
    }

    #[test]
    fn test_search_rejects_unknown_sort() {
        assert!(search("orderBy=stock").is_err());
        assert!(search("order=sideways").is_err());
        assert!(search("minPrice=50&maxPrice=5").unwrap().into_filter().is_err());
    }

    #[test]
    fn test_field_parsers() {
        assert_eq!(parse_price("19.999").unwrap(), Decimal::from_str("20.00").unwrap());
        assert!(parse_price("0").is_err());
        assert!(parse_price("free").is_err());
        assert_eq!(parse_stock(" 7 ").unwrap(), 7);
        assert!(parse_stock("-1").is_err());
        assert!(parse_category("not-a-uuid").is_err());
        assert!(parse_variants(r#"[{"id":"6f1c1b7e-8a4e-4a53-9d0b-1a3c5e7f9b21","stock":-2}]"#).is_err());
    }

    #[test]
    fn test_new_product_requires_fields() {
        let form = ProductForm {
            name: Some("Linen Shirt".to_string()),
            price: Some("25".to_string()),
            ..ProductForm::default()
        };
        let err = form.new_product().unwrap_err();
        assert_eq!(err.to_string(), "description is required");
    }

    #[test]
    fn test_new_product_from_complete_form() {
        let category = CategoryId::new();
        let form = ProductForm {
            name: Some(" Linen Shirt ".to_string()),
            description: Some("Breathable".to_string()),
            price: Some("25".to_string()),
            stock: Some("4".to_string()),
            category_id: Some(category.to_string()),
            ..ProductForm::default()
        };
        let new = form.new_product().unwrap();
        assert_eq!(new.name, "Linen Shirt");
        assert_eq!(new.stock, 4);
        assert_eq!(new.category_id, category);
        assert!(new.image_urls.is_empty());
    }
}
