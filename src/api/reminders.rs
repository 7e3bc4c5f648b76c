//! Reminder endpoints, including conversion into a task

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Category, Reminder, Task};
use crate::timewindow::{day_bounds_for, local_date_of, local_date_time_to_utc, parse_local_date};

use super::{ApiError, AppState, AuthUser};

/// Category that converted reminders land in, created on demand.
const DEFAULT_CATEGORY_NAME: &str = "Work";

/// Converted reminders become fixed one-hour tasks.
const CONVERTED_DURATION_MIN: i64 = 60;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reminders", get(list_reminders).post(create_reminder))
        .route(
            "/reminders/{id}",
            axum::routing::patch(update_reminder).delete(delete_reminder),
        )
        .route("/reminders/{id}/convert-to-task", post(convert_to_task))
}

/// GET /api/reminders
async fn list_reminders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let reminders = state.db.reminders(&user.user_id)?;
    Ok(Json(reminders))
}

#[derive(Debug, Deserialize)]
struct CreateReminder {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    date: String,
    #[serde(default)]
    time: String,
}

/// POST /api/reminders - `date` + `time` combine to `dueAt` under the
/// fixed local offset.
async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateReminder>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.is_empty() {
        return Err(ApiError::InvalidInput("Title is required".to_string()));
    }

    let due_at = parse_local_date(&req.date)
        .ok()
        .and_then(|date| local_date_time_to_utc(date, &req.time).ok())
        .ok_or_else(|| ApiError::InvalidInput("Invalid date or time format".to_string()))?;

    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        title: req.title,
        description: req.description,
        due_at: Some(due_at),
        created_at: now,
        updated_at: now,
    };

    state.db.insert_reminder(&reminder)?;

    Ok((StatusCode::CREATED, Json(reminder)))
}

/// Closed update set for reminders.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateReminder {
    title: Option<String>,
    description: Option<String>,
    due_at: Option<String>,
}

/// PATCH /api/reminders/{id}
async fn update_reminder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateReminder>,
) -> Result<impl IntoResponse, ApiError> {
    let mut reminder = state
        .db
        .get_reminder(&user.user_id, &id)?
        .ok_or_else(|| ApiError::NotFound("Reminder not found".to_string()))?;

    if let Some(title) = req.title {
        if title.is_empty() {
            return Err(ApiError::InvalidInput("Title is required".to_string()));
        }
        reminder.title = title;
    }
    if let Some(description) = req.description {
        reminder.description = Some(description);
    }
    if let Some(due_at) = req.due_at.as_deref() {
        let parsed = DateTime::parse_from_rfc3339(due_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ApiError::InvalidInput("Invalid date format".to_string()))?;
        reminder.due_at = Some(parsed);
    }

    reminder.updated_at = Utc::now();
    state.db.update_reminder(&reminder)?;

    Ok(Json(reminder))
}

/// DELETE /api/reminders/{id}
async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_reminder(&user.user_id, &id)? {
        return Err(ApiError::NotFound("Reminder not found".to_string()));
    }
    Ok(Json(serde_json::json!({
        "message": "Reminder deleted successfully"
    })))
}

/// POST /api/reminders/{id}/convert-to-task
///
/// Creates a one-hour task at the reminder's due time in the default
/// category and deletes the reminder, atomically.
async fn convert_to_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reminder = state
        .db
        .get_reminder(&user.user_id, &id)?
        .ok_or_else(|| ApiError::NotFound("Reminder not found".to_string()))?;

    let Some(due_at) = reminder.due_at else {
        return Err(ApiError::InvalidInput(
            "Reminder has no due date".to_string(),
        ));
    };

    let now = Utc::now();
    // Reuse the user's default category, or create it inside the
    // conversion transaction.
    let existing = state
        .db
        .find_category_by_name(&user.user_id, DEFAULT_CATEGORY_NAME)?;
    let new_category = match &existing {
        Some(_) => None,
        None => Some(Category {
            id: Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            name: DEFAULT_CATEGORY_NAME.to_string(),
            color: None,
            is_system: true,
            position: state.db.next_category_position(&user.user_id)?,
            created_at: now,
            updated_at: now,
        }),
    };
    let category = existing.as_ref().or(new_category.as_ref()).unwrap();

    let task = Task {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        title: reminder.title.clone(),
        category_id: Some(category.id.clone()),
        category_name: Some(category.name.clone()),
        date: day_bounds_for(local_date_of(due_at)).0,
        start: Some(due_at),
        end: Some(due_at + Duration::minutes(CONVERTED_DURATION_MIN)),
        duration_min: Some(CONVERTED_DURATION_MIN),
        done: false,
        notes: reminder.description.clone(),
        is_event: false,
        is_reminder: true,
        carryover: false,
        created_at: now,
        updated_at: now,
    };

    state
        .db
        .convert_reminder_to_task(&user.user_id, &reminder.id, &task, new_category.as_ref())?;

    tracing::info!(reminder = %reminder.id, task = %task.id, "Reminder converted to task");

    Ok((StatusCode::CREATED, Json(task)))
}
