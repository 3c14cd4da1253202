use anyhow::anyhow;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::users::User;

// The users table is owned by the registration flow; this store only reads it.

pub async fn find_user_by_id(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to fetch user by id: {}", e))
        })?;

    Ok(user)
}

pub async fn find_user_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to fetch user by email: {}", e))
        })?;

    Ok(user)
}
