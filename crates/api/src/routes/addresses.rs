//! Shipping address route handlers.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use tradepost_core::AddressId;

use crate::db::AddressRepository;
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::models::address::{AddressFields, ShippingAddress};
use crate::state::AppState;

/// Build the `/shipping-addresses` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{id}", get(show).patch(update).delete(remove))
}

fn missing_field(field: &str) -> AppError {
    AppError::BadRequest(format!("{field} is required"))
}

/// Load an address the caller owns.
async fn owned(
    repo: &AddressRepository<'_>,
    user: &CurrentUser,
    id: AddressId,
) -> Result<ShippingAddress> {
    let address = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Shipping address not found".to_string()))?;
    if address.user_id != user.id {
        return Err(AppError::Forbidden(
            "You do not have access to this shipping address".to_string(),
        ));
    }
    Ok(address)
}

/// `POST /shipping-addresses`
///
/// # Errors
///
/// 400 when a required field is missing or blank.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddressFields>,
) -> Result<(StatusCode, Json<ShippingAddress>)> {
    let address = body.into_new().map_err(missing_field)?;
    let created = AddressRepository::new(state.pool())
        .create(user.id, &address)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /shipping-addresses`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<ShippingAddress>>> {
    Ok(Json(
        AddressRepository::new(state.pool())
            .list_for_user(user.id)
            .await?,
    ))
}

/// `GET /shipping-addresses/{id}`
///
/// # Errors
///
/// 404 if missing, 403 if owned by someone else.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Json<ShippingAddress>> {
    let repo = AddressRepository::new(state.pool());
    Ok(Json(owned(&repo, &user, id).await?))
}

/// `PATCH /shipping-addresses/{id}`
///
/// # Errors
///
/// 404 if missing, 403 if owned by someone else, 400 on a blank field.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
    Json(body): Json<AddressFields>,
) -> Result<Json<ShippingAddress>> {
    let repo = AddressRepository::new(state.pool());
    let existing = owned(&repo, &user, id).await?;
    let address = body.apply_to(&existing).map_err(missing_field)?;
    Ok(Json(repo.update(id, &address).await?))
}

/// `DELETE /shipping-addresses/{id}`
///
/// # Errors
///
/// 404 if missing, 403 if owned by someone else.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<StatusCode> {
    let repo = AddressRepository::new(state.pool());
    owned(&repo, &user, id).await?;
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
