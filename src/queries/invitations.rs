use anyhow::anyhow;
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ConflictReason};
use crate::models::groups::{GroupInvitation, InvitationStatus};
use crate::queries::is_unique_violation;

pub async fn insert_group_invitation(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    inviter_id: Uuid,
    invitee_id: Uuid,
) -> AppResult<GroupInvitation> {
    let now = Utc::now();

    let invitation = sqlx::query_as::<_, GroupInvitation>(
        "INSERT INTO group_invitations (group_id, inviter_id, invitee_id, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(group_id)
    .bind(inviter_id)
    .bind(invitee_id)
    .bind(InvitationStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(
                ConflictReason::PendingInvitationExists,
                anyhow!("A pending invitation already exists for this user"),
            )
        } else {
            AppError::InternalServerError(anyhow!("Failed to create group invitation: {}", e))
        }
    })?;

    Ok(invitation)
}

pub async fn find_invitation_by_id(
    conn: &mut SqliteConnection,
    invitation_id: i64,
) -> AppResult<GroupInvitation> {
    let invitation =
        sqlx::query_as::<_, GroupInvitation>("SELECT * FROM group_invitations WHERE id = ?")
            .bind(invitation_id)
            .fetch_one(conn)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => AppError::NotFound(anyhow!("Invitation not found")),
                _ => AppError::InternalServerError(anyhow!("Failed to fetch invitation: {}", e)),
            })?;

    Ok(invitation)
}

pub async fn find_pending_invitation(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    invitee_id: Uuid,
) -> AppResult<Option<GroupInvitation>> {
    let invitation = sqlx::query_as::<_, GroupInvitation>(
        "SELECT * FROM group_invitations WHERE group_id = ? AND invitee_id = ? AND status = ?",
    )
    .bind(group_id)
    .bind(invitee_id)
    .bind(InvitationStatus::Pending)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to look up pending invitation: {}", e))
    })?;

    Ok(invitation)
}

pub async fn update_invitation_status(
    conn: &mut SqliteConnection,
    invitation_id: i64,
    status: InvitationStatus,
) -> AppResult<GroupInvitation> {
    let invitation = sqlx::query_as::<_, GroupInvitation>(
        "UPDATE group_invitations SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(invitation_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to update group invitation: {}", e))
    })?;

    Ok(invitation)
}

pub async fn list_pending_invitations_for_user(
    conn: &mut SqliteConnection,
    invitee_id: Uuid,
) -> AppResult<Vec<GroupInvitation>> {
    let invitations = sqlx::query_as::<_, GroupInvitation>(
        "SELECT * FROM group_invitations WHERE invitee_id = ? AND status = ? \
         ORDER BY created_at DESC",
    )
    .bind(invitee_id)
    .bind(InvitationStatus::Pending)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list invitations: {}", e))
    })?;

    Ok(invitations)
}

pub async fn list_pending_invitations_for_group(
    conn: &mut SqliteConnection,
    group_id: Uuid,
) -> AppResult<Vec<GroupInvitation>> {
    let invitations = sqlx::query_as::<_, GroupInvitation>(
        "SELECT * FROM group_invitations WHERE group_id = ? AND status = ? \
         ORDER BY created_at DESC",
    )
    .bind(group_id)
    .bind(InvitationStatus::Pending)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list group invitations: {}", e))
    })?;

    Ok(invitations)
}
