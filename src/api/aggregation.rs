//! Aggregation endpoints: day summary, weekly trends, weekly analytics
//!
//! Thin handlers; the arithmetic lives in [`crate::aggregation`] where the
//! persister can call it without going through HTTP.

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::aggregation::{self, DaySummary, WeeklyTrends};
use crate::models::{CategoryAverage, FocusRatio};
use crate::timewindow::{parse_local_date, today_local};

use super::{ApiError, AppState, AuthUser};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/aggregation/day/summary", get(day_summary))
        .route("/aggregation/trends/weekly", get(weekly_trends))
        .route(
            "/aggregation/analytics/weekly/update",
            post(update_weekly_analytics),
        )
        .route("/aggregation/analytics/weekly", get(weekly_analytics))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    start: Option<String>,
}

/// GET /api/aggregation/day/summary?date=YYYY-MM-DD
async fn day_summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DaySummary>, ApiError> {
    let date = query
        .date
        .as_deref()
        .and_then(|d| parse_local_date(d).ok())
        .ok_or_else(|| ApiError::InvalidInput("Invalid date parameter".to_string()))?;

    let summary = aggregation::day_summary(&state.db, &user.user_id, date)?;
    Ok(Json(summary))
}

/// GET /api/aggregation/trends/weekly?start=YYYY-MM-DD
///
/// `start` may be any date inside the target week; it is normalized to
/// that week's Monday.
async fn weekly_trends(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StartQuery>,
) -> Result<Json<WeeklyTrends>, ApiError> {
    let start = query
        .start
        .as_deref()
        .ok_or_else(|| ApiError::InvalidInput("Invalid start parameter".to_string()))?;
    let start =
        parse_local_date(start).map_err(|_| ApiError::InvalidInput("Invalid start date".to_string()))?;

    let trends = aggregation::weekly_trends(&state.db, &user.user_id, start)?;
    Ok(Json(trends))
}

/// Week-level fields echoed back by the write path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsSummary {
    total_minutes: i64,
    by_category: Vec<CategoryAverage>,
    focus_ratio: FocusRatio,
    streak: i64,
}

/// POST /api/aggregation/analytics/weekly/update?date=YYYY-MM-DD
///
/// Defaults to today when no date is given.
async fn update_weekly_analytics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let today = match query.date.as_deref() {
        Some(date) => parse_local_date(date)
            .map_err(|_| ApiError::InvalidInput("Invalid date parameter".to_string()))?,
        None => today_local(),
    };

    let analytics = aggregation::update_weekly_analytics(&state.db, &user.user_id, today)?;

    tracing::info!(
        user_id = %user.user_id,
        username = %user.username,
        week_start = %analytics.week_start,
        total_minutes = analytics.total_minutes,
        streak = analytics.streak,
        "Weekly analytics updated"
    );

    Ok(Json(serde_json::json!({
        "message": "Weekly analytics updated successfully",
        "analytics": AnalyticsSummary {
            total_minutes: analytics.total_minutes,
            by_category: analytics.by_category,
            focus_ratio: analytics.focus_ratio,
            streak: analytics.streak,
        },
    })))
}

/// GET /api/aggregation/analytics/weekly?date=YYYY-MM-DD
///
/// Read-only: returns the stored aggregate (or an all-zero default)
/// plus display-only derived fields. Never writes.
async fn weekly_analytics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let date = match query.date.as_deref() {
        Some(date) => parse_local_date(date)
            .map_err(|_| ApiError::InvalidInput("Invalid date parameter".to_string()))?,
        None => today_local(),
    };

    let view = aggregation::weekly_analytics_view(&state.db, &user.user_id, date)?;
    Ok(Json(view))
}
