//! Wishlist route handlers.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;

use tradepost_core::ProductId;

use crate::db::{RepositoryError, WishlistRepository};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::middleware::RequireAuth;
use crate::models::wishlist::WishlistView;
use crate::state::AppState;

/// Build the `/wishlists` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/add", post(add))
        .route("/{product_id}", delete(remove))
}

/// Add-to-wishlist body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToWishlistRequest {
    pub product_id: ProductId,
}

/// `GET /wishlists`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<WishlistView>> {
    Ok(Json(
        WishlistRepository::new(state.pool()).view(user.id).await?,
    ))
}

/// `POST /wishlists/add`
///
/// # Errors
///
/// 404 for an unknown product, 409 "Item already in wishlist".
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddToWishlistRequest>,
) -> Result<(StatusCode, Json<WishlistView>)> {
    let wishlists = WishlistRepository::new(state.pool());
    let wishlist = wishlists.get_or_create(user.id).await?;

    wishlists
        .add(wishlist.id, body.product_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Product not found".to_string()),
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(wishlists.view(user.id).await?)))
}

/// `DELETE /wishlists/{productId}`
///
/// # Errors
///
/// 404 if the product is not in the wishlist.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistView>> {
    let wishlists = WishlistRepository::new(state.pool());
    let wishlist = wishlists.get_or_create(user.id).await?;

    wishlists
        .remove(wishlist.id, product_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::NotFound("Product not found in wishlist".to_string())
            }
            other => other.into(),
        })?;

    Ok(Json(wishlists.view(user.id).await?))
}

/// `DELETE /wishlists`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<StatusCode> {
    let wishlists = WishlistRepository::new(state.pool());
    let wishlist = wishlists.get_or_create(user.id).await?;
    wishlists.clear(wishlist.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
