use anyhow::anyhow;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, ConflictReason};
use crate::models::connections::{ChatRequest, Conversation, RequestStatus};
use crate::models::users::User;
use crate::queries::connections as connection_queries;
use crate::queries::users as user_queries;

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateRequestData {
    /// The receiver's user id, or their email address.
    #[validate(length(min = 1, message = "Receiver cannot be empty"))]
    pub receiver: String,
}

/// Orchestrates the chat request lifecycle and the conversations that
/// acceptance creates. Holds nothing but the pool handle; every operation
/// re-reads state inside its own connection or transaction.
#[derive(Clone)]
pub struct ConnectionService {
    pool: SqlitePool,
}

impl ConnectionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_request(
        &self,
        sender_id: Uuid,
        mut payload: CreateRequestData,
    ) -> AppResult<ChatRequest> {
        payload.receiver = payload.receiver.trim().to_string();
        payload.validate().map_err(|e| {
            AppError::BadRequest(anyhow!("Invalid chat request data: {}", e))
        })?;

        let mut conn = self.acquire().await?;

        let sender = user_queries::find_user_by_id(&mut conn, sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Sender account not found")))?;
        if !sender.is_active() {
            return Err(AppError::Forbidden(anyhow!("Sender account is not active")));
        }

        let receiver = resolve_receiver(&mut conn, &payload.receiver).await?;
        if receiver.id == sender_id {
            return Err(AppError::BadRequest(anyhow!(
                "Cannot send a chat request to yourself"
            )));
        }

        if connection_queries::find_conversation_between(&mut conn, sender_id, receiver.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                ConflictReason::ConversationExists,
                anyhow!("A conversation with this user already exists"),
            ));
        }

        // Fast-path check; the pair index on chat_requests is the real guard.
        if connection_queries::find_active_request_between(&mut conn, sender_id, receiver.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                ConflictReason::RequestExists,
                anyhow!("A chat request between these users already exists"),
            ));
        }

        let request =
            connection_queries::insert_chat_request(&mut conn, sender_id, receiver.id).await?;
        log::info!(
            "chat request {} created: {} -> {}",
            request.id,
            request.sender_id,
            request.receiver_id
        );
        Ok(request)
    }

    /// Accepting flips the request to its terminal state and creates the
    /// conversation in the same transaction; neither write lands without the
    /// other.
    pub async fn accept_request(
        &self,
        request_id: i64,
        acting_user_id: Uuid,
    ) -> AppResult<ChatRequest> {
        let mut tx = self.begin().await?;

        let request = connection_queries::find_chat_request_by_id(&mut tx, request_id).await?;

        if acting_user_id != request.receiver_id {
            return Err(AppError::Forbidden(anyhow!(
                "Only the receiver can accept this chat request"
            )));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyResolved,
                anyhow!("Chat request has already been resolved"),
            ));
        }

        let request = connection_queries::update_chat_request_status(
            &mut tx,
            request_id,
            RequestStatus::Accepted,
        )
        .await?;

        let conversation = connection_queries::insert_conversation(
            &mut tx,
            Uuid::new_v4(),
            request.sender_id,
            request.receiver_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!(
            "chat request {} accepted, conversation {} created",
            request.id,
            conversation.id
        );
        Ok(request)
    }

    pub async fn reject_request(
        &self,
        request_id: i64,
        acting_user_id: Uuid,
    ) -> AppResult<ChatRequest> {
        let mut tx = self.begin().await?;

        let request = connection_queries::find_chat_request_by_id(&mut tx, request_id).await?;

        if acting_user_id != request.receiver_id {
            return Err(AppError::Forbidden(anyhow!(
                "Only the receiver can reject this chat request"
            )));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyResolved,
                anyhow!("Chat request has already been resolved"),
            ));
        }

        let request = connection_queries::update_chat_request_status(
            &mut tx,
            request_id,
            RequestStatus::Rejected,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("chat request {} rejected", request.id);
        Ok(request)
    }

    /// Absent and not-yours are indistinguishable to the caller.
    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<Conversation> {
        let mut conn = self.acquire().await?;

        match connection_queries::find_conversation_by_id(&mut conn, conversation_id).await? {
            Some(conversation) if conversation.involves(acting_user_id) => Ok(conversation),
            _ => Err(AppError::NotFound(anyhow!("Conversation not found"))),
        }
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut conn = self.acquire().await?;
        connection_queries::list_conversations_for_user(&mut conn, user_id).await
    }

    pub async fn conversation_exists_between(
        &self,
        acting_user_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<bool> {
        let mut conn = self.acquire().await?;
        let conversation =
            connection_queries::find_conversation_between(&mut conn, acting_user_id, other_user_id)
                .await?;
        Ok(conversation.is_some())
    }

    pub async fn list_pending_requests_received(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<ChatRequest>> {
        let mut conn = self.acquire().await?;
        connection_queries::list_pending_requests_received(&mut conn, user_id).await
    }

    pub async fn list_pending_requests_sent(&self, user_id: Uuid) -> AppResult<Vec<ChatRequest>> {
        let mut conn = self.acquire().await?;
        connection_queries::list_pending_requests_sent(&mut conn, user_id).await
    }

    async fn acquire(&self) -> AppResult<PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(|e| {
            AppError::InternalServerError(anyhow!(
                "Failed to acquire database connection: {}",
                e
            ))
        })
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Database transaction failed: {}", e))
        })
    }
}

/// Receivers can be addressed by id or by email; both must resolve to an
/// active account.
async fn resolve_receiver(conn: &mut SqliteConnection, receiver: &str) -> AppResult<User> {
    let user = match Uuid::parse_str(receiver) {
        Ok(id) => user_queries::find_user_by_id(conn, id).await?,
        Err(_) => user_queries::find_user_by_email(conn, receiver).await?,
    };

    user.filter(|u| u.is_active())
        .ok_or_else(|| AppError::NotFound(anyhow!("Receiver not found")))
}
