use anyhow::anyhow;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::groups::{Group, GroupMember};
use crate::queries::groups as group_queries;

// Authorization predicates shared by both lifecycle services. They take the
// caller's connection so the check runs inside the same transaction as the
// mutation it guards, against freshly committed state.

pub async fn require_member(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
) -> AppResult<(Group, GroupMember)> {
    let group = group_queries::find_group_by_id(conn, group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Group not found")))?;

    let member = group_queries::find_group_member(conn, group_id, user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden(anyhow!("You are not a member of this group")))?;

    Ok((group, member))
}

pub async fn require_admin(
    conn: &mut SqliteConnection,
    group_id: Uuid,
    user_id: Uuid,
) -> AppResult<(Group, GroupMember)> {
    let (group, member) = require_member(conn, group_id, user_id).await?;

    if !member.is_admin() {
        return Err(AppError::Forbidden(anyhow!(
            "Only group admins can perform this action"
        )));
    }

    Ok((group, member))
}
