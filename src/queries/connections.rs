use anyhow::anyhow;
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ConflictReason};
use crate::models::connections::{ChatRequest, Conversation, RequestStatus};
use crate::queries::is_unique_violation;

pub async fn insert_chat_request(
    conn: &mut SqliteConnection,
    sender_id: Uuid,
    receiver_id: Uuid,
) -> AppResult<ChatRequest> {
    let now = Utc::now();

    let request = sqlx::query_as::<_, ChatRequest>(
        "INSERT INTO chat_requests (sender_id, receiver_id, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(RequestStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(
                ConflictReason::RequestExists,
                anyhow!("A chat request between these users already exists"),
            )
        } else {
            AppError::InternalServerError(anyhow!("Failed to create chat request: {}", e))
        }
    })?;

    Ok(request)
}

pub async fn find_chat_request_by_id(
    conn: &mut SqliteConnection,
    request_id: i64,
) -> AppResult<ChatRequest> {
    let request = sqlx::query_as::<_, ChatRequest>("SELECT * FROM chat_requests WHERE id = ?")
        .bind(request_id)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound(anyhow!("Chat request not found")),
            _ => AppError::InternalServerError(anyhow!("Failed to fetch chat request: {}", e)),
        })?;

    Ok(request)
}

/// Any non-rejected request between the pair, in either direction. Rejected
/// requests are history and do not block a new attempt.
pub async fn find_active_request_between(
    conn: &mut SqliteConnection,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<Option<ChatRequest>> {
    let request = sqlx::query_as::<_, ChatRequest>(
        "SELECT * FROM chat_requests \
         WHERE ((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)) \
         AND status <> ? LIMIT 1",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .bind(RequestStatus::Rejected)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to look up chat requests: {}", e))
    })?;

    Ok(request)
}

pub async fn update_chat_request_status(
    conn: &mut SqliteConnection,
    request_id: i64,
    status: RequestStatus,
) -> AppResult<ChatRequest> {
    let request = sqlx::query_as::<_, ChatRequest>(
        "UPDATE chat_requests SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(request_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to update chat request status: {}", e))
    })?;

    Ok(request)
}

pub async fn list_pending_requests_received(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> AppResult<Vec<ChatRequest>> {
    let requests = sqlx::query_as::<_, ChatRequest>(
        "SELECT * FROM chat_requests WHERE receiver_id = ? AND status = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(RequestStatus::Pending)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list received chat requests: {}", e))
    })?;

    Ok(requests)
}

pub async fn list_pending_requests_sent(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> AppResult<Vec<ChatRequest>> {
    let requests = sqlx::query_as::<_, ChatRequest>(
        "SELECT * FROM chat_requests WHERE sender_id = ? AND status = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(RequestStatus::Pending)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list sent chat requests: {}", e))
    })?;

    Ok(requests)
}

/// The single writer path for conversations; only request acceptance calls
/// this. Equal ids are rejected before canonicalization.
pub async fn insert_conversation(
    conn: &mut SqliteConnection,
    id: Uuid,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<Conversation> {
    if user_a == user_b {
        return Err(AppError::BadRequest(anyhow!(
            "A conversation needs two distinct users"
        )));
    }

    let conversation = sqlx::query_as::<_, Conversation>(
        "INSERT INTO conversations (id, user1_id, user2_id, created_at) \
         VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(id)
    // Store user IDs in a consistent order so a pair maps to exactly one
    // row and the uniqueness constraint can do its job.
    .bind(std::cmp::min(user_a, user_b))
    .bind(std::cmp::max(user_a, user_b))
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(
                ConflictReason::ConversationExists,
                anyhow!("A conversation between these users already exists"),
            )
        } else {
            AppError::InternalServerError(anyhow!("Failed to create conversation: {}", e))
        }
    })?;

    Ok(conversation)
}

pub async fn find_conversation_by_id(
    conn: &mut SqliteConnection,
    conversation_id: Uuid,
) -> AppResult<Option<Conversation>> {
    let conversation =
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                AppError::InternalServerError(anyhow!("Failed to fetch conversation: {}", e))
            })?;

    Ok(conversation)
}

pub async fn find_conversation_between(
    conn: &mut SqliteConnection,
    user_a: Uuid,
    user_b: Uuid,
) -> AppResult<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE user1_id = ? AND user2_id = ?",
    )
    .bind(std::cmp::min(user_a, user_b))
    .bind(std::cmp::max(user_a, user_b))
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to look up conversation: {}", e))
    })?;

    Ok(conversation)
}

pub async fn list_conversations_for_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> AppResult<Vec<Conversation>> {
    let conversations = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE user1_id = ? OR user2_id = ? \
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list conversations: {}", e))
    })?;

    Ok(conversations)
}
