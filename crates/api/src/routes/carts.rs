//! Cart route handlers. Every route acts on the caller's own cart.

use axum::{
    Router,
    extract::State,
    routing::{get, patch, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_core::{CartItemId, ProductId};

use crate::db::{CartRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::middleware::RequireAuth;
use crate::models::cart::{CartItem, CartView};
use crate::state::AppState;

/// Build the `/carts` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show))
        .route("/add", post(add))
        .route("/item/{id}", patch(update).delete(remove))
        .route("/total", get(total))
}

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Quantity change body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// `{total}`
#[derive(Debug, Serialize)]
pub struct CartTotal {
    pub total: Decimal,
}

/// `{message}`
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

fn positive_quantity(quantity: i32) -> Result<i32> {
    if quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }
    Ok(quantity)
}

fn not_found(what: &str) -> impl FnOnce(RepositoryError) -> AppError + '_ {
    move |e| match e {
        RepositoryError::NotFound => AppError::NotFound(format!("{what} not found")),
        other => other.into(),
    }
}

/// `GET /carts`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(CartRepository::new(state.pool()).view(user.id).await?))
}

/// `POST /carts/add`
///
/// # Errors
///
/// 404 for an unknown product, 400 "Insufficient stock".
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartItem>> {
    let quantity = positive_quantity(body.quantity)?;
    let carts = CartRepository::new(state.pool());
    let cart = carts.get_or_create(user.id).await?;

    let item = carts
        .add_item(cart.id, body.product_id, quantity)
        .await
        .map_err(not_found("Product"))?;
    Ok(Json(item))
}

/// `PATCH /carts/item/{id}`
///
/// # Errors
///
/// 404 if the item is not in the caller's cart, 400 "Insufficient stock".
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<CartItemId>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<CartItem>> {
    let quantity = positive_quantity(body.quantity)?;
    let carts = CartRepository::new(state.pool());
    let cart = carts.get_or_create(user.id).await?;

    let item = carts
        .update_item(cart.id, id, quantity)
        .await
        .map_err(not_found("Cart item"))?;
    Ok(Json(item))
}

/// `DELETE /carts/item/{id}`
///
/// # Errors
///
/// 404 if the item is not in the caller's cart.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<CartItemId>,
) -> Result<Json<Message>> {
    let carts = CartRepository::new(state.pool());
    let cart = carts.get_or_create(user.id).await?;

    carts
        .remove_item(cart.id, id)
        .await
        .map_err(not_found("Cart item"))?;
    Ok(Json(Message {
        message: "Item removed successfully",
    }))
}

/// `GET /carts/total`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn total(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartTotal>> {
    let carts = CartRepository::new(state.pool());
    let cart = carts.get_or_create(user.id).await?;
    Ok(Json(CartTotal {
        total: carts.total(cart.id).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(positive_quantity(0).is_err());
        assert!(positive_quantity(-3).is_err());
        assert_eq!(positive_quantity(2).ok(), Some(2));
    }

    #[test]
    fn test_not_found_message() {
        let err = not_found("Cart item")(RepositoryError::NotFound);
        assert_eq!(err.to_string(), "Cart item not found");

        let err = not_found("Product")(RepositoryError::Invalid("Insufficient stock".to_string()));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
