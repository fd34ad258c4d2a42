//! Admin reporting endpoints.

use axum::{Router, extract::State, routing::get};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use tradepost_core::DateRange;

use crate::db::AnalyticsRepository;
use crate::db::analytics::{MonthlyCustomers, StatusCount, Summary, TopProduct, TotalSales};
use crate::error::{AppError, Result};
use crate::extract::{Json, Query};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

const DEFAULT_TOP_SELLING: i64 = 10;
const MAX_TOP_SELLING: i64 = 100;

/// Build the `/analytics` router. Every route requires an admin.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/total-sales", get(total_sales))
        .route("/top-selling-products", get(top_selling))
        .route("/orders-by-status", get(orders_by_status))
        .route("/customer-growth", get(customer_growth))
        .route("/summary", get(summary))
}

/// `?startDate&endDate`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `?limit`
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// Start of reporting when the client gives none.
fn reporting_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl RangeQuery {
    fn range(&self, now: DateTime<Utc>) -> Result<DateRange> {
        DateRange::parse(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            reporting_epoch(),
            now,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))
    }
}

impl LimitQuery {
    fn clamped(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_TOP_SELLING)
            .clamp(1, MAX_TOP_SELLING)
    }
}

/// `GET /analytics/total-sales`
///
/// # Errors
///
/// 400 on an unparseable or inverted window.
pub async fn total_sales(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<RangeQuery>,
) -> Result<Json<TotalSales>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .total_sales(range)
            .await?,
    ))
}

/// `GET /analytics/top-selling-products`
///
/// # Errors
///
/// 500 on database failure.
pub async fn top_selling(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TopProduct>>> {
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .top_selling(query.clamped())
            .await?,
    ))
}

/// `GET /analytics/orders-by-status`
///
/// # Errors
///
/// 500 on database failure.
pub async fn orders_by_status(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<StatusCount>>> {
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .orders_by_status()
            .await?,
    ))
}

/// `GET /analytics/customer-growth`
///
/// # Errors
///
/// 400 on an unparseable or inverted window.
pub async fn customer_growth(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<MonthlyCustomers>>> {
    let range = query.range(Utc::now())?;
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .customer_growth(range)
            .await?,
    ))
}

/// `GET /analytics/summary`
///
/// # Errors
///
/// 500 on database failure.
pub async fn summary(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Summary>> {
    Ok(Json(AnalyticsRepository::new(state.pool()).summary().await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamped() {
        assert_eq!(LimitQuery::default().clamped(), 10);
        assert_eq!(LimitQuery { limit: Some(500) }.clamped(), 100);
        assert_eq!(LimitQuery { limit: Some(0) }.clamped(), 1);
        assert_eq!(LimitQuery { limit: Some(25) }.clamped(), 25);
    }

    #[test]
    fn test_range_defaults_to_reporting_epoch() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let range = RangeQuery::default().range(now).unwrap();
        assert_eq!(range.start_date, reporting_epoch());
        assert_eq!(range.end_date, now);
    }

    #[test]
    fn test_inverted_range_is_bad_request() {
        let query = RangeQuery {
            start_date: Some("2025-02-01".to_string()),
            end_date: Some("2025-01-01".to_string()),
        };
        let err = query.range(Utc::now()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
