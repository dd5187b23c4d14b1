use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config;
use crate::database::manager::DatabaseError;

/// Stored refresh token. One per user; issuing a new one replaces the old.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: Uuid,
    pub user_id: Uuid,
    pub expiry_date: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Refresh token not found")]
    NotFound,
    #[error("Refresh token was expired. Please make a new login request")]
    Expired,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub async fn create_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<RefreshToken, DatabaseError> {
    // replace any existing token to keep the unique user constraint
    sqlx::query("DELETE FROM \"refresh_tokens\" WHERE \"user_id\" = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    let token = Uuid::new_v4();
    let expiry_hours = config::config().security.refresh_expiry_hours;
    let expiry_date = Utc::now() + Duration::hours(expiry_hours as i64);

    sqlx::query(
        "INSERT INTO \"refresh_tokens\" (\"id\", \"user_id\", \"token\", \"expiry_date\") \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token)
    .bind(expiry_date)
    .execute(pool)
    .await?;

    Ok(RefreshToken { token, user_id, expiry_date })
}

/// Looks a token up and checks its expiry. Expired tokens are deleted so
/// the client has to log in again.
pub async fn verify_refresh_token(pool: &PgPool, token: Uuid) -> Result<RefreshToken, RefreshError> {
    let row = sqlx::query(
        "SELECT \"user_id\", \"expiry_date\" FROM \"refresh_tokens\" WHERE \"token\" = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(DatabaseError::from)?;

    let row = row.ok_or(RefreshError::NotFound)?;
    let user_id: Uuid = row.try_get("user_id").map_err(DatabaseError::from)?;
    let expiry_date: DateTime<Utc> = row.try_get("expiry_date").map_err(DatabaseError::from)?;

    if expiry_date < Utc::now() {
        sqlx::query("DELETE FROM \"refresh_tokens\" WHERE \"token\" = $1")
            .bind(token)
            .execute(pool)
            .await
            .map_err(DatabaseError::from)?;
        return Err(RefreshError::Expired);
    }

    Ok(RefreshToken { token, user_id, expiry_date })
}

/// Verifies the presented token and issues a replacement for the same user.
pub async fn rotate_refresh_token(pool: &PgPool, token: Uuid) -> Result<RefreshToken, RefreshError> {
    let current = verify_refresh_token(pool, token).await?;
    Ok(create_refresh_token(pool, current.user_id).await?)
}
