use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(20) // 20 concurrent connections
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;
    Ok(pool)
}

pub async fn connect_from_env() -> Result<SqlitePool> {
    dotenv().ok();
    let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    connect(&db_url).await
}

/// An in-memory database for tests and local experiments. The pool is pinned
/// to a single connection; SQLite gives every `:memory:` connection its own
/// database, so a wider pool would see an empty schema on the second handle.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid database URL")?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to open in-memory database")?;
    Ok(pool)
}

/// Creates the five core tables and their uniqueness constraints. The partial
/// indexes are load-bearing: they are the authoritative guard behind every
/// service-level duplicate check.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Users (read-only here; rows are seeded by the registration flow)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            account_status TEXT NOT NULL DEFAULT 'pending_verification',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Chat requests
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (sender_id <> receiver_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // A rejected request does not block the pair from trying again
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS chat_requests_pair_key
            ON chat_requests (sender_id, receiver_id)
            WHERE status <> 'rejected';
        "#,
    )
    .execute(pool)
    .await?;

    // Conversations, one row per pair, smaller id first
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id BLOB PRIMARY KEY,
            user1_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            user2_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL,
            last_message_at TIMESTAMP,
            CHECK (user1_id < user2_id),
            UNIQUE (user1_id, user2_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Groups
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_by BLOB NOT NULL REFERENCES users(id),
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            last_message_at TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Group members
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id BLOB NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL DEFAULT 'member',
            joined_at TIMESTAMP NOT NULL,
            UNIQUE (group_id, user_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Group invitations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_invitations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id BLOB NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            inviter_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            invitee_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (inviter_id <> invitee_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Only pending invitations are unique; terminal ones stay as history
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS group_invitations_pending_key
            ON group_invitations (group_id, invitee_id)
            WHERE status = 'pending';
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
