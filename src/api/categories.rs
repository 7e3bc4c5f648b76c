//! Category endpoints

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Category;

use super::{ApiError, AppState, AuthUser, FieldError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            axum::routing::patch(update_category).delete(delete_category),
        )
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_category(name: &str, color: Option<&str>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if name.is_empty() || name.len() > 40 {
        errors.push(FieldError::new("name", "Name must be 1-40 characters"));
    }
    if let Some(color) = color
        && !is_hex_color(color)
    {
        errors.push(FieldError::new("color", "Color must be #RRGGBB"));
    }
    errors
}

/// GET /api/categories - ordered by position, then name
async fn list_categories(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state.db.categories(&user.user_id)?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
struct CreateCategory {
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: Option<String>,
}

/// POST /api/categories
async fn create_category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateCategory>,
) -> Result<impl IntoResponse, ApiError> {
    let errors = validate_category(&req.name, req.color.as_deref());
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if state
        .db
        .find_category_by_name(&user.user_id, &req.name)?
        .is_some()
    {
        return Err(ApiError::Conflict("Category already exists".to_string()));
    }

    let now = Utc::now();
    let category = Category {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        name: req.name,
        color: req.color,
        is_system: false,
        position: state.db.next_category_position(&user.user_id)?,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_category(&category)?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Closed update set for categories.
#[derive(Debug, Deserialize)]
struct UpdateCategory {
    name: Option<String>,
    color: Option<String>,
    position: Option<i64>,
}

/// PATCH /api/categories/{id}
async fn update_category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategory>,
) -> Result<impl IntoResponse, ApiError> {
    let mut category = state
        .db
        .get_category(&user.user_id, &id)?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    if let Some(name) = req.name
        && name != category.name
    {
        let errors = validate_category(&name, None);
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        if state
            .db
            .find_category_by_name(&user.user_id, &name)?
            .is_some()
        {
            return Err(ApiError::Conflict("Category already exists".to_string()));
        }
        category.name = name;
    }
    if let Some(color) = req.color {
        if !is_hex_color(&color) {
            return Err(ApiError::Validation(vec![FieldError::new(
                "color",
                "Color must be #RRGGBB",
            )]));
        }
        category.color = Some(color);
    }
    if let Some(position) = req.position {
        category.position = position;
    }

    category.updated_at = Utc::now();
    state.db.update_category(&category)?;

    Ok(Json(category))
}

/// DELETE /api/categories/{id}
async fn delete_category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.delete_category(&user.user_id, &id)? {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#A1b2C3"));
        assert!(!is_hex_color("A1b2C3"));
        assert!(!is_hex_color("#A1b2C"));
        assert!(!is_hex_color("#A1b2C3d"));
        assert!(!is_hex_color("#A1b2Cz"));
    }

    #[test]
    fn category_validation_flags_name_and_color() {
        assert!(validate_category("Deep Work", Some("#112233")).is_empty());
        let errors = validate_category("", Some("red"));
        assert_eq!(errors.len(), 2);
    }
}
