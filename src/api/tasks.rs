//! Task endpoints

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Event, Task};
use crate::timewindow::{
    day_bounds, day_bounds_for, local_date_of, local_date_time_to_utc, minutes_between,
    parse_local_date, today_local,
};

use super::{ApiError, AppState, AuthUser, FieldError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/today", get(today_tasks))
        .route("/tasks/{id}", axum::routing::patch(update_task).delete(delete_task))
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    date: Option<String>,
    done: Option<bool>,
}

/// One slot on the merged day timeline (task or event).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MergedItem {
    id: String,
    title: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    is_event: bool,
    done: Option<bool>,
    location: Option<String>,
    notes: Option<String>,
}

fn merge_timeline(tasks: &[Task], events: &[Event]) -> Vec<MergedItem> {
    let mut merged: Vec<MergedItem> = tasks
        .iter()
        .map(|t| MergedItem {
            id: t.id.clone(),
            title: t.title.clone(),
            start: t.start,
            end: t.end,
            is_event: false,
            done: Some(t.done),
            location: None,
            notes: t.notes.clone(),
        })
        .chain(events.iter().map(|e| MergedItem {
            id: e.id.clone(),
            title: e.title.clone(),
            start: Some(e.start),
            end: Some(e.end),
            is_event: true,
            done: None,
            location: e.location.clone(),
            notes: e.notes.clone(),
        }))
        .collect();

    merged.sort_by_key(|item| item.start);
    merged
}

/// GET /api/tasks?date=YYYY-MM-DD[&done=bool]
///
/// Day view: tasks dated in (or spanning into) the local day, the day's
/// events, and a merged timeline of both.
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListTasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (day_start, day_end) = query
        .date
        .as_deref()
        .and_then(|d| day_bounds(d).ok())
        .ok_or_else(|| {
            ApiError::InvalidInput("Invalid date parameter. Expected format: YYYY-MM-DD".to_string())
        })?;
    let tasks = state
        .db
        .day_tasks(&user.user_id, day_start, day_end, query.done)?;
    let events = state
        .db
        .events_overlapping(&user.user_id, day_start, day_end)?;
    let merged = merge_timeline(&tasks, &events);

    Ok(Json(serde_json::json!({
        "tasks": tasks,
        "events": events,
        "merged": merged,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTask {
    #[serde(default)]
    title: String,
    category_id: String,
    date: String,
    #[serde(rename = "startHHMM")]
    start_hhmm: String,
    #[serde(rename = "endHHMM")]
    end_hhmm: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    is_event: bool,
    #[serde(default)]
    is_reminder: bool,
}

/// POST /api/tasks
async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTask>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.is_empty() || req.title.len() > 240 {
        return Err(ApiError::Validation(vec![FieldError::new(
            "title",
            "Title must be 1-240 characters",
        )]));
    }

    let date = parse_local_date(&req.date)
        .map_err(|_| ApiError::InvalidInput("Invalid date. Expected format: YYYY-MM-DD".to_string()))?;
    let start = local_date_time_to_utc(date, &req.start_hhmm)
        .map_err(|_| ApiError::InvalidInput("Invalid startHHMM. Expected format: HH:MM".to_string()))?;
    let end = local_date_time_to_utc(date, &req.end_hhmm)
        .map_err(|_| ApiError::InvalidInput("Invalid endHHMM. Expected format: HH:MM".to_string()))?;

    if end <= start {
        return Err(ApiError::InvalidInput(
            "End time must be after start time".to_string(),
        ));
    }

    let category = state
        .db
        .get_category(&user.user_id, &req.category_id)?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        title: req.title,
        category_id: Some(category.id),
        category_name: Some(category.name),
        date: day_bounds_for(date).0,
        start: Some(start),
        end: Some(end),
        duration_min: Some(minutes_between(start, end)),
        done: false,
        notes: req.notes,
        is_event: req.is_event,
        is_reminder: req.is_reminder,
        carryover: false,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_task(&task)?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Closed update set; anything not listed here cannot be patched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTask {
    title: Option<String>,
    category_id: Option<String>,
    start: Option<String>,
    end: Option<String>,
    notes: Option<String>,
    done: Option<bool>,
    carryover: Option<bool>,
}

fn parse_instant(value: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::InvalidInput(format!("Invalid {field}: expected an RFC3339 instant")))
}

/// PATCH /api/tasks/{id}
///
/// Merges the allow-listed fields, then re-validates the combined state:
/// `end > start`, duration re-derived, `date` re-derived from `start`.
async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTask>,
) -> Result<impl IntoResponse, ApiError> {
    let mut task = state
        .db
        .get_task(&user.user_id, &id)?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if let Some(title) = req.title {
        if title.is_empty() || title.len() > 240 {
            return Err(ApiError::Validation(vec![FieldError::new(
                "title",
                "Title must be 1-240 characters",
            )]));
        }
        task.title = title;
    }

    if let Some(category_id) = req.category_id
        && task.category_id.as_deref() != Some(category_id.as_str())
    {
        let category = state
            .db
            .get_category(&user.user_id, &category_id)?
            .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;
        task.category_id = Some(category.id);
        task.category_name = Some(category.name);
    }

    if let Some(start) = req.start.as_deref() {
        task.start = Some(parse_instant(start, "start")?);
    }
    if let Some(end) = req.end.as_deref() {
        task.end = Some(parse_instant(end, "end")?);
    }
    if let Some(notes) = req.notes {
        task.notes = Some(notes);
    }
    if let Some(done) = req.done {
        task.done = done;
    }
    if let Some(carryover) = req.carryover {
        task.carryover = carryover;
    }

    if let (Some(start), Some(end)) = (task.start, task.end) {
        if end <= start {
            return Err(ApiError::InvalidInput(
                "End time must be after start time".to_string(),
            ));
        }
        task.duration_min = Some(minutes_between(start, end));
        task.date = day_bounds_for(local_date_of(start)).0;
    }

    task.updated_at = Utc::now();
    state.db.update_task(&task)?;

    Ok(Json(task))
}

/// DELETE /api/tasks/{id}
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_task(&user.user_id, &id)? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tasks/today - hours spanned by today's timed tasks
async fn today_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (day_start, day_end) = day_bounds_for(today_local());
    let tasks = state.db.tasks_dated_in(&user.user_id, day_start, day_end)?;

    let spent_minutes: i64 = tasks
        .iter()
        .filter_map(|t| match (t.start, t.end) {
            (Some(start), Some(end)) => Some(minutes_between(start, end)),
            _ => None,
        })
        .sum();
    let spent_hours = (spent_minutes as f64 / 60.0).round() as i64;

    Ok(Json(serde_json::json!({ "spentHours": spent_hours })))
}
