use anyhow::anyhow;
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ConflictReason};
use crate::models::groups::{Group, GroupMember, MemberRole};
use crate::queries::is_unique_violation;

pub async fn insert_group(
    conn: &mut SqliteConnection,
    id: Uuid,
    created_by: Uuid,
    name: &str,
    description: Option<&str>,
) -> AppResult<Group> {
    let now = Utc::now();

    let group = sqlx::query_as::<_, Group>(
        "INSERT INTO groups (id, name, description, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::InternalServerError(anyhow!("Failed to create group: {}", e)))?;

    Ok(group)
}

pub async fn find_group_by_id(
    conn: &mut SqliteConnection,
    group_id: Uuid,
) -> AppResult<Option<Group>> {
    let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to fetch group: {}", e)))?;

    Ok(group)
}

pub async fn update_group(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> AppResult<Group> {
    let group = sqlx::query_as::<_, Group>(
        "UPDATE groups SET name = ?, description = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(name)
    .bind(description)
    .bind(Utc::now())
    .bind(group_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::InternalServerError(anyhow!("Failed to update group: {}", e)))?;

    Ok(group)
}

/// Removes the group and everything hanging off it. Children go first so the
/// teardown does not depend on cascade support in the connection.
pub async fn delete_group(conn: &mut SqliteConnection, group_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM group_invitations WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to delete group invitations: {}", e))
        })?;

    sqlx::query("DELETE FROM group_members WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to delete group members: {}", e))
        })?;

    sqlx::query("DELETE FROM groups WHERE id = ?")
        .bind(group_id)
        .execute(conn)
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to delete group: {}", e)))?;

    Ok(())
}

pub async fn insert_group_member(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
) -> AppResult<GroupMember> {
    let member = sqlx::query_as::<_, GroupMember>(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) \
         VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(group_id)
    .bind(user_id)
    .bind(role)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(
                ConflictReason::AlreadyMember,
                anyhow!("User is already a member of this group"),
            )
        } else {
            AppError::InternalServerError(anyhow!("Failed to add group member: {}", e))
        }
    })?;

    Ok(member)
}

pub async fn find_group_member(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<GroupMember>> {
    let member = sqlx::query_as::<_, GroupMember>(
        "SELECT * FROM group_members WHERE group_id = ? AND user_id = ?",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to fetch group member: {}", e))
    })?;

    Ok(member)
}

pub async fn update_member_role(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
) -> AppResult<GroupMember> {
    let member = sqlx::query_as::<_, GroupMember>(
        "UPDATE group_members SET role = ? WHERE group_id = ? AND user_id = ? RETURNING *",
    )
    .bind(role)
    .bind(group_id)
    .bind(user_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to update member role: {}", e))
    })?;

    Ok(member)
}

pub async fn delete_group_member(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id)
        .bind(user_id)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to remove group member: {}", e))
        })?;

    Ok(())
}

pub async fn count_admins(conn: &mut SqliteConnection, group_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM group_members WHERE group_id = ? AND role = ?",
    )
    .bind(group_id)
    .bind(MemberRole::Admin)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::InternalServerError(anyhow!("Failed to count admins: {}", e)))?;

    Ok(count)
}

pub async fn count_members(conn: &mut SqliteConnection, group_id: Uuid) -> AppResult<i64> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
            .bind(group_id)
            .fetch_one(conn)
            .await
            .map_err(|e| {
                AppError::InternalServerError(anyhow!("Failed to count members: {}", e))
            })?;

    Ok(count)
}

pub async fn list_groups_for_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> AppResult<Vec<Group>> {
    let groups = sqlx::query_as::<_, Group>(
        "SELECT g.* FROM groups g \
         JOIN group_members m ON g.id = m.group_id \
         WHERE m.user_id = ? ORDER BY g.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await
    .map_err(|e| AppError::InternalServerError(anyhow!("Failed to list groups: {}", e)))?;

    Ok(groups)
}

pub async fn list_group_members(
    conn: &mut SqliteConnection,
    group_id: Uuid,
) -> AppResult<Vec<GroupMember>> {
    let members = sqlx::query_as::<_, GroupMember>(
        "SELECT * FROM group_members WHERE group_id = ? ORDER BY joined_at ASC",
    )
    .bind(group_id)
    .fetch_all(conn)
    .await
    .map_err(|e| {
        AppError::InternalServerError(anyhow!("Failed to list group members: {}", e))
    })?;

    Ok(members)
}
