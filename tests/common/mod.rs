use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use linkup_core::db;
use linkup_core::error::{AppError, ConflictReason};
use linkup_core::models::users::AccountStatus;

pub async fn setup_pool() -> SqlitePool {
    let _ = env_logger::builder().is_test(true).try_init();

    let pool = db::connect_in_memory().await.expect("in-memory database");
    db::migrate(&pool).await.expect("schema bootstrap");
    pool
}

/// The users table belongs to the out-of-scope registration flow, so tests
/// seed it directly.
pub async fn seed_user(pool: &SqlitePool, email: &str) -> Uuid {
    seed_user_with_status(pool, email, AccountStatus::Active).await
}

pub async fn seed_user_with_status(
    pool: &SqlitePool,
    email: &str,
    status: AccountStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, email, account_status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(email)
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("seed user");

    id
}

#[track_caller]
pub fn assert_conflict(err: AppError, reason: ConflictReason) {
    assert_eq!(err.conflict_reason(), Some(reason), "unexpected error: {err}");
}
