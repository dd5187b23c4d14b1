use axum::{response::IntoResponse, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{self, refresh, Claims};
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::repository;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::schema::{registry, EntityDescriptor};

fn users_descriptor() -> Result<&'static EntityDescriptor, ApiError> {
    registry()
        .get("users")
        .ok_or_else(|| ApiError::internal_server_error("users entity not registered"))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/login - verify credentials, issue JWT and refresh token
pub async fn login(Json(request): Json<LoginRequest>) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool().await?;
    let users = users_descriptor()?;

    let rows = repository::select_where(
        pool,
        users.table_name,
        "\"username\" = $1::text AND \"deleted\" = FALSE",
        &[json!(request.username)],
    )
    .await?;
    let row = rows.into_iter().next().ok_or_else(|| ApiError::unauthorized("Bad credentials"))?;

    let stored = row.get("password").and_then(|v| v.as_str()).unwrap_or_default();
    if !auth::verify_password(&request.password, stored) {
        return Err(ApiError::unauthorized("Bad credentials"));
    }
    if !row.get("active").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(ApiError::forbidden("User is not active"));
    }

    let user_id = row
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::internal_server_error("user row has no id"))?;

    let token = auth::generate_jwt(&Claims::new(user_id, request.username.clone()))?;
    let refresh_token = refresh::create_refresh_token(pool, user_id).await?;

    tracing::info!(username = %request.username, "user logged in");

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "refresh_token": refresh_token.token,
            "expires_in": config::config().security.jwt_expiry_hours * 3600,
            "user": {
                "id": user_id,
                "username": request.username,
            }
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Uuid,
}

/// POST /auth/refresh - rotate the refresh token and issue a fresh JWT
pub async fn refresh_session(
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool().await?;

    let rotated = refresh::rotate_refresh_token(pool, request.refresh_token).await?;

    let users = users_descriptor()?;
    let row = repository::find_by_id(pool, users, rotated.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
    let username = row.get("username").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let token = auth::generate_jwt(&Claims::new(rotated.user_id, username))?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "refresh_token": rotated.token,
            "expires_in": config::config().security.jwt_expiry_hours * 3600,
        }
    })))
}

/// GET /api/auth/whoami - identity behind the presented token
pub async fn whoami(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": {
            "id": user.user_id,
            "username": user.username,
        }
    }))
}
