//! Order route handlers.

use axum::{
    Router,
    extract::State,
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};

use tradepost_core::{OrderId, OrderStatus, Pagination, SortOrder};

use crate::db::{OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::order::{Order, OrderDetail, OrderSortField};
use crate::state::AppState;

/// Build the `/orders` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/user/orders", get(mine))
        .route("/{id}", get(show))
        .route("/{id}/status", patch(update_status))
}

/// Admin order list query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
    #[serde(default)]
    pub order_by: OrderSortField,
    #[serde(default)]
    pub order: SortOrder,
}

const fn default_take() -> i64 {
    Pagination::DEFAULT_TAKE
}

/// A page of orders.
#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
}

/// Status change body.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

fn order_not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound("Order not found".to_string()),
        other => other.into(),
    }
}

/// `GET /orders` (admin)
///
/// # Errors
///
/// 400 on an unknown sort field.
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderPage>> {
    let page = Pagination {
        skip: query.skip,
        take: query.take,
    };
    let (orders, total) = OrderRepository::new(state.pool())
        .list(page, query.order_by, query.order)
        .await?;
    Ok(Json(OrderPage { orders, total }))
}

/// `GET /orders/user/orders`
///
/// # Errors
///
/// 401 if not logged in.
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderDetail>>> {
    Ok(Json(OrderRepository::new(state.pool()).for_user(user.id).await?))
}

/// `GET /orders/{id}` (owner or admin)
///
/// # Errors
///
/// 404 if missing, 403 for someone else's order.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let detail = OrderRepository::new(state.pool())
        .detail(id)
        .await
        .map_err(order_not_found)?;
    if !user.can_access(detail.order.user_id) {
        return Err(AppError::Forbidden(
            "You do not have access to this order".to_string(),
        ));
    }
    Ok(Json(detail))
}

/// `PATCH /orders/{id}/status` (admin)
///
/// # Errors
///
/// 404 if missing, 400 when the lifecycle forbids the move.
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool())
        .update_status(id, body.status)
        .await
        .map_err(order_not_found)?;
    state.wake_outbox();

    tracing::info!(admin_id = %admin.id, order_id = %id, status = %order.status, "Order status updated");
    Ok(Json(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(raw: &str) -> std::result::Result<OrderListQuery, String> {
        let uri: axum::http::Uri = format!("/orders?{raw}").parse().unwrap();
        axum::extract::Query::<OrderListQuery>::try_from_uri(&uri)
            .map(|q| q.0)
            .map_err(|e| e.body_text())
    }

    #[test]
    fn test_list_query_defaults() {
        let q = query("").unwrap();
        assert_eq!(q.order_by, OrderSortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
        assert_eq!(q.take, Pagination::DEFAULT_TAKE);
    }

    #[test]
    fn test_list_query_sorting() {
        let q = query("orderBy=total&order=asc&skip=20").unwrap();
        assert_eq!(q.order_by, OrderSortField::Total);
        assert_eq!(q.order, SortOrder::Asc);
        assert_eq!(q.skip, 20);
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        assert!(query("orderBy=email").is_err());
    }

    #[test]
    fn test_status_body() {
        let body: UpdateStatusRequest = serde_json::from_str(r#"{"status":"SHIPPED"}"#).unwrap();
        assert_eq!(body.status, OrderStatus::Shipped);
        assert!(serde_json::from_str::<UpdateStatusRequest>(r#"{"status":"LOST"}"#).is_err());
    }
}
