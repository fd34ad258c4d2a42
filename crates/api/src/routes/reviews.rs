//! Review route handlers.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use tradepost_core::{Pagination, ProductId, ReviewId};

use crate::db::{RepositoryError, ReviewRepository};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::models::review::{Review, ReviewDetail};
use crate::state::AppState;

/// Build the `/reviews` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/{id}", get(show).patch(update).delete(remove))
}

/// New review body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub product_id: ProductId,
    pub rating: i16,
    pub comment: Option<String>,
}

/// Review edit body.
#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

/// Review list query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuery {
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
}

const fn default_take() -> i64 {
    Pagination::DEFAULT_TAKE
}

impl ReviewQuery {
    const fn page(&self) -> Pagination {
        Pagination {
            skip: self.skip,
            take: self.take,
        }
    }
}

/// A page of reviews.
#[derive(Debug, Serialize)]
pub struct ReviewPage {
    pub reviews: Vec<ReviewDetail>,
    pub total: i64,
}

fn valid_rating(rating: i16) -> Result<i16> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(AppError::BadRequest(
            "rating must be between 1 and 5".to_string(),
        ))
    }
}

fn review_not_found() -> AppError {
    AppError::NotFound("Review not found".to_string())
}

/// Load a review the caller wrote, or any review for an admin.
async fn editable(
    repo: &ReviewRepository<'_>,
    user: &CurrentUser,
    id: ReviewId,
) -> Result<ReviewDetail> {
    let review = repo.get(id).await?.ok_or_else(review_not_found)?;
    if !user.can_access(review.review.user_id) {
        return Err(AppError::Forbidden(
            "You can only modify your own reviews".to_string(),
        ));
    }
    Ok(review)
}

/// `POST /reviews`
///
/// # Errors
///
/// 404 for an unknown product, 400 without a delivered purchase or on a repeat review.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let rating = valid_rating(body.rating)?;
    let review = ReviewRepository::new(state.pool())
        .create(user.id, body.product_id, rating, body.comment.as_deref())
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Product not found".to_string()),
            other => other.into(),
        })?;

    tracing::info!(user_id = %user.id, product_id = %body.product_id, rating, "Review created");
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /reviews`
///
/// # Errors
///
/// 500 on database failure.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ReviewPage>> {
    let (reviews, total) = ReviewRepository::new(state.pool())
        .list(query.product_id, query.page())
        .await?;
    Ok(Json(ReviewPage { reviews, total }))
}

/// `GET /reviews/{id}`
///
/// # Errors
///
/// 404 if missing.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<Json<ReviewDetail>> {
    let review = ReviewRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(review_not_found)?;
    Ok(Json(review))
}

/// `PATCH /reviews/{id}` (author or admin)
///
/// # Errors
///
/// 404 if missing, 403 for someone else's review, 400 on a bad rating.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<Review>> {
    let rating = body.rating.map(valid_rating).transpose()?;
    let repo = ReviewRepository::new(state.pool());
    editable(&repo, &user, id).await?;

    Ok(Json(repo.update(id, rating, body.comment.as_deref()).await?))
}

/// `DELETE /reviews/{id}` (author or admin)
///
/// # Errors
///
/// 404 if missing, 403 for someone else's review.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    let repo = ReviewRepository::new(state.pool());
    editable(&repo, &user, id).await?;
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
