//! Category route handlers.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Deserializer};

use tradepost_core::CategoryId;

use crate::db::categories::PARENT_NOT_FOUND;
use crate::db::{CategoryRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::middleware::RequireAdmin;
use crate::models::catalog::{Category, CategoryDetail, CategoryNode};
use crate::state::AppState;

/// Build the `/categories` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{id}", get(show).patch(update).delete(remove))
}

/// New category body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

/// Category update body. `parentId: null` detaches the category.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub parent_id: Option<Option<CategoryId>>,
}

/// Distinguish a missing field (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn category_name(name: &str) -> Result<&str> {
    match name.trim() {
        "" => Err(AppError::BadRequest("Category name cannot be empty".to_string())),
        trimmed => Ok(trimmed),
    }
}

async fn require_parent(repo: &CategoryRepository<'_>, parent_id: CategoryId) -> Result<()> {
    if repo.get(parent_id).await?.is_none() {
        return Err(AppError::BadRequest(PARENT_NOT_FOUND.to_string()));
    }
    Ok(())
}

/// `POST /categories` (admin)
///
/// # Errors
///
/// 400 on an empty name or unknown parent, 409 on a duplicate name.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    let repo = CategoryRepository::new(state.pool());
    let name = category_name(&body.name)?;
    if let Some(parent_id) = body.parent_id {
        require_parent(&repo, parent_id).await?;
    }

    let category = repo.create(name, body.parent_id).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// `GET /categories`
///
/// # Errors
///
/// 500 on database failure.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<CategoryNode>>> {
    Ok(Json(CategoryRepository::new(state.pool()).list().await?))
}

/// `GET /categories/{id}`
///
/// # Errors
///
/// 404 if missing.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<CategoryDetail>> {
    let detail = CategoryRepository::new(state.pool())
        .detail(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Category not found".to_string()),
            other => other.into(),
        })?;
    Ok(Json(detail))
}

/// `PATCH /categories/{id}` (admin)
///
/// # Errors
///
/// 400 on a cyclic or unknown parent, 404 if missing, 409 on a duplicate name.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<CategoryId>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>> {
    let repo = CategoryRepository::new(state.pool());
    if repo.get(id).await?.is_none() {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    let name = body.name.as_deref().map(category_name).transpose()?;
    Ok(Json(repo.update(id, name, body.parent_id).await?))
}

/// `DELETE /categories/{id}` (admin)
///
/// # Errors
///
/// 404 if missing, 409 while products are filed under it.
pub async fn remove(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<CategoryId>,
) -> Result<StatusCode> {
    CategoryRepository::new(state.pool()).delete(id).await?;
    tracing::info!(admin_id = %admin.id, category_id = %id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_id_tri_state() {
        let absent: UpdateCategoryRequest = serde_json::from_str(r#"{"name":"Shoes"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: UpdateCategoryRequest = serde_json::from_str(r#"{"parentId":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let id = CategoryId::new();
        let set: UpdateCategoryRequest =
            serde_json::from_str(&format!(r#"{{"parentId":"{id}"}}"#)).unwrap();
        assert_eq!(set.parent_id, Some(Some(id)));
    }

    #[test]
    fn test_category_name_trims() {
        assert_eq!(category_name("  Shoes ").unwrap(), "Shoes");
        assert!(category_name("   ").is_err());
    }
}
