//! Registration, login, and logout

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{User, UserPreferences};

use super::{ApiError, AppState, FieldError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Characters allowed in passwords besides letters and digits
const PASSWORD_SPECIALS: &str = "!@#$%^&*";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Public view of an account (never includes the password hash)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: String,
    username: String,
    email: String,
    name: String,
    profile_picture: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

fn validate_registration(req: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if req.username.len() < 8 || req.username.len() > 15 {
        errors.push(FieldError::new(
            "username",
            "Username must be 8-15 characters",
        ));
    } else if !req.username.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(FieldError::new(
            "username",
            "Username can only contain letters and digits",
        ));
    }

    if req.email.len() < 5 || !req.email.contains('@') || !req.email.contains('.') {
        errors.push(FieldError::new("email", "Invalid email format"));
    }

    errors.extend(validate_password(&req.password));

    if req.name.trim().len() < 5 {
        errors.push(FieldError::new("name", "Name must be at least 5 characters"));
    }

    errors
}

fn validate_password(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if password.len() < 8 || password.len() > 20 {
        errors.push(FieldError::new(
            "password",
            "Password must be 8-20 characters",
        ));
        return errors;
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one digit",
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one special character (!@#$%^&*)",
        ));
    }
    if !password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c))
    {
        errors.push(FieldError::new(
            "password",
            "Password can only contain letters, digits, and special characters (!@#$%^&*)",
        ));
    }

    errors
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let errors = validate_registration(&req);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if state.db.username_exists(&req.username)? {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash: hash_password(&req.password)?,
        name: req.name.trim().to_string(),
        profile_picture: req.profile_picture,
        preferences: UserPreferences::default(),
        created_at: now,
        updated_at: now,
    };

    state.db.create_user(&user)?;

    let token = state.config.auth.sign_token(&user.id, &user.username)?;

    tracing::info!(username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "User registered successfully",
            "user": UserView::from(&user),
            "token": token,
        })),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();
    if req.username.is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    }
    if req.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Same response for unknown user and wrong password
    let Some(user) = state.db.find_user_by_username(&req.username)? else {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    };
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = state.config.auth.sign_token(&user.id, &user.username)?;

    Ok(Json(serde_json::json!({
        "message": "Login successful",
        "user": UserView::from(&user),
        "token": token,
    })))
}

async fn logout() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Logout successful",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            profile_picture: None,
        }
    }

    #[test]
    fn valid_registration_passes() {
        let req = request("alicesmith", "alice@example.com", "Sup3rSecret!", "Alice Smith");
        assert!(validate_registration(&req).is_empty());
    }

    #[test]
    fn short_username_and_weak_password_are_field_errors() {
        let req = request("al", "alice@example.com", "password", "Alice Smith");
        let errors = validate_registration(&req);
        assert!(errors.iter().any(|e| e.field == "username"));
        // "password" lacks uppercase, digit, and special
        assert_eq!(errors.iter().filter(|e| e.field == "password").count(), 3);
    }

    #[test]
    fn password_with_forbidden_characters_is_rejected() {
        let errors = validate_password("Sup3r Secret!");
        assert!(errors.iter().any(|e| e.message.contains("can only contain")));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("Sup3rSecret!").unwrap();
        assert!(verify_password("Sup3rSecret!", &hash));
        assert!(!verify_password("WrongSecret1!", &hash));
        assert!(!verify_password("Sup3rSecret!", "not-a-hash"));
    }
}
