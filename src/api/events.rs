//! Calendar event endpoints

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Event, EventSource};
use crate::timewindow::{day_bounds_for, today_local};

use super::{ApiError, AppState, AuthUser, FieldError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/today", get(today_events))
        .route("/events/import-ics", post(import_ics))
        .route(
            "/events/{id}",
            axum::routing::patch(update_event).delete(delete_event),
        )
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::InvalidInput("Invalid date format".to_string()))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

/// GET /api/events?from=..&to=.. - events overlapping the range
async fn list_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(from), Some(to)) = (query.from.as_deref(), query.to.as_deref()) else {
        return Err(ApiError::InvalidInput("Invalid date range".to_string()));
    };
    let from = parse_instant(from)?;
    let to = parse_instant(to)?;

    if to <= from {
        return Err(ApiError::InvalidInput(
            "Invalid date range: to must be after from".to_string(),
        ));
    }

    let events = state.db.events_overlapping(&user.user_id, from, to)?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEvent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// POST /api/events
async fn create_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateEvent>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.is_empty() || req.title.len() > 240 {
        return Err(ApiError::Validation(vec![FieldError::new(
            "title",
            "Title must be 1-240 characters",
        )]));
    }

    let start = parse_instant(&req.start)?;
    let end = parse_instant(&req.end)?;
    if end <= start {
        return Err(ApiError::InvalidInput(
            "End time must be after start time".to_string(),
        ));
    }

    let now = Utc::now();
    let event = Event {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        title: req.title,
        location: req.location,
        start,
        end,
        all_day: req.all_day,
        notes: req.notes,
        source: EventSource::Manual,
        ics_uid: None,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_event(&event)?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Closed update set for events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEvent {
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    all_day: Option<bool>,
    location: Option<String>,
    notes: Option<String>,
}

/// PATCH /api/events/{id}
async fn update_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let mut event = state
        .db
        .get_event(&user.user_id, &id)?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    if let Some(title) = req.title {
        if title.is_empty() || title.len() > 240 {
            return Err(ApiError::Validation(vec![FieldError::new(
                "title",
                "Title must be 1-240 characters",
            )]));
        }
        event.title = title;
    }
    if let Some(start) = req.start.as_deref() {
        event.start = parse_instant(start)?;
    }
    if let Some(end) = req.end.as_deref() {
        event.end = parse_instant(end)?;
    }
    if let Some(all_day) = req.all_day {
        event.all_day = all_day;
    }
    if let Some(location) = req.location {
        event.location = Some(location);
    }
    if let Some(notes) = req.notes {
        event.notes = Some(notes);
    }

    if event.end <= event.start {
        return Err(ApiError::InvalidInput(
            "End time must be after start time".to_string(),
        ));
    }

    event.updated_at = Utc::now();
    state.db.update_event(&event)?;

    Ok(Json(event))
}

/// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_event(&user.user_id, &id)? {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/events/import-ics - reserved; `source` and `icsUid` already
/// model imported events.
async fn import_ics() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "ICS import not implemented yet" }))
}

/// GET /api/events/today - events starting within today's local day
async fn today_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (day_start, day_end) = day_bounds_for(today_local());
    let events = state
        .db
        .events_starting_in(&user.user_id, day_start, day_end)?;
    Ok(Json(events))
}
