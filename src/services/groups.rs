use anyhow::anyhow;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, ConflictReason};
use crate::models::groups::{Group, GroupInvitation, GroupMember, InvitationStatus, MemberRole};
use crate::queries::groups as group_queries;
use crate::queries::invitations as invitation_queries;
use crate::queries::users as user_queries;
use crate::services::permissions;

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateGroupData {
    #[validate(length(min = 1, message = "Group name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateGroupData {
    /// Fields left out of the payload keep their current value.
    #[validate(length(min = 1, message = "Group name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Orchestrates groups, invitations, and role-gated membership. The central
/// rule it protects: a group that still has members always has an admin.
#[derive(Clone)]
pub struct MembershipService {
    pool: SqlitePool,
}

impl MembershipService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The creator joins their own group as the first admin, in the same
    /// transaction that creates it.
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        mut payload: CreateGroupData,
    ) -> AppResult<Group> {
        payload.name = payload.name.trim().to_string();
        if let Some(description) = &mut payload.description {
            *description = description.trim().to_string();
        }
        payload
            .validate()
            .map_err(|e| AppError::BadRequest(anyhow!("Invalid group data: {}", e)))?;

        let mut tx = self.begin().await?;

        let creator = user_queries::find_user_by_id(&mut tx, creator_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Creator account not found")))?;
        if !creator.is_active() {
            return Err(AppError::Forbidden(anyhow!("Creator account is not active")));
        }

        let group = group_queries::insert_group(
            &mut tx,
            Uuid::new_v4(),
            creator_id,
            &payload.name,
            payload.description.as_deref(),
        )
        .await?;
        group_queries::insert_group_member(&mut tx, group.id, creator_id, MemberRole::Admin)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("group {} created by {}", group.id, creator_id);
        Ok(group)
    }

    pub async fn update_group(
        &self,
        group_id: Uuid,
        acting_user_id: Uuid,
        mut payload: UpdateGroupData,
    ) -> AppResult<Group> {
        if let Some(name) = &mut payload.name {
            *name = name.trim().to_string();
        }
        if let Some(description) = &mut payload.description {
            *description = description.trim().to_string();
        }
        payload
            .validate()
            .map_err(|e| AppError::BadRequest(anyhow!("Invalid group data: {}", e)))?;

        let mut tx = self.begin().await?;

        let (group, _) = permissions::require_admin(&mut tx, group_id, acting_user_id).await?;

        let name = payload.name.unwrap_or(group.name);
        let description = payload.description.or(group.description);
        let group =
            group_queries::update_group(&mut tx, group_id, &name, description.as_deref()).await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(group)
    }

    /// Absent and not-yours are indistinguishable to the caller.
    pub async fn get_group(&self, group_id: Uuid, acting_user_id: Uuid) -> AppResult<Group> {
        let mut conn = self.acquire().await?;

        let group = group_queries::find_group_by_id(&mut conn, group_id).await?;
        if let Some(group) = group {
            if group_queries::find_group_member(&mut conn, group.id, acting_user_id)
                .await?
                .is_some()
            {
                return Ok(group);
            }
        }
        Err(AppError::NotFound(anyhow!("Group not found")))
    }

    pub async fn create_invitation(
        &self,
        group_id: Uuid,
        inviter_id: Uuid,
        invitee_id: Uuid,
    ) -> AppResult<GroupInvitation> {
        if inviter_id == invitee_id {
            return Err(AppError::BadRequest(anyhow!("Cannot invite yourself")));
        }

        let mut conn = self.acquire().await?;

        permissions::require_admin(&mut conn, group_id, inviter_id).await?;

        user_queries::find_user_by_id(&mut conn, invitee_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| AppError::NotFound(anyhow!("Invitee not found")))?;

        if group_queries::find_group_member(&mut conn, group_id, invitee_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyMember,
                anyhow!("User is already a member of this group"),
            ));
        }

        // Fast-path check; the pending-invitation index is the real guard.
        if invitation_queries::find_pending_invitation(&mut conn, group_id, invitee_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                ConflictReason::PendingInvitationExists,
                anyhow!("A pending invitation already exists for this user"),
            ));
        }

        let invitation =
            invitation_queries::insert_group_invitation(&mut conn, group_id, inviter_id, invitee_id)
                .await?;
        log::info!(
            "invitation {} created: {} invited {} to group {}",
            invitation.id,
            inviter_id,
            invitee_id,
            group_id
        );
        Ok(invitation)
    }

    /// Acceptance resolves the invitation and enrolls the invitee as a
    /// regular member in one transaction.
    pub async fn accept_invitation(
        &self,
        invitation_id: i64,
        acting_user_id: Uuid,
    ) -> AppResult<GroupInvitation> {
        let mut tx = self.begin().await?;

        let invitation = invitation_queries::find_invitation_by_id(&mut tx, invitation_id).await?;

        if acting_user_id != invitation.invitee_id {
            return Err(AppError::Forbidden(anyhow!(
                "Only the invitee can accept this invitation"
            )));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyResolved,
                anyhow!("Invitation has already been resolved"),
            ));
        }

        let invitation = invitation_queries::update_invitation_status(
            &mut tx,
            invitation_id,
            InvitationStatus::Accepted,
        )
        .await?;
        group_queries::insert_group_member(
            &mut tx,
            invitation.group_id,
            invitation.invitee_id,
            MemberRole::Member,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!(
            "invitation {} accepted, {} joined group {}",
            invitation.id,
            invitation.invitee_id,
            invitation.group_id
        );
        Ok(invitation)
    }

    pub async fn reject_invitation(
        &self,
        invitation_id: i64,
        acting_user_id: Uuid,
    ) -> AppResult<GroupInvitation> {
        let mut tx = self.begin().await?;

        let invitation = invitation_queries::find_invitation_by_id(&mut tx, invitation_id).await?;

        if acting_user_id != invitation.invitee_id {
            return Err(AppError::Forbidden(anyhow!(
                "Only the invitee can reject this invitation"
            )));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyResolved,
                anyhow!("Invitation has already been resolved"),
            ));
        }

        let invitation = invitation_queries::update_invitation_status(
            &mut tx,
            invitation_id,
            InvitationStatus::Rejected,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("invitation {} rejected", invitation.id);
        Ok(invitation)
    }

    /// Any admin of the group can withdraw a pending invitation, not just
    /// the one who sent it.
    pub async fn cancel_invitation(
        &self,
        invitation_id: i64,
        acting_user_id: Uuid,
    ) -> AppResult<GroupInvitation> {
        let mut tx = self.begin().await?;

        let invitation = invitation_queries::find_invitation_by_id(&mut tx, invitation_id).await?;

        permissions::require_admin(&mut tx, invitation.group_id, acting_user_id).await?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyResolved,
                anyhow!("Invitation has already been resolved"),
            ));
        }

        let invitation = invitation_queries::update_invitation_status(
            &mut tx,
            invitation_id,
            InvitationStatus::Cancelled,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("invitation {} cancelled", invitation.id);
        Ok(invitation)
    }

    pub async fn promote_member(
        &self,
        group_id: Uuid,
        acting_user_id: Uuid,
        target_user_id: Uuid,
    ) -> AppResult<GroupMember> {
        let mut tx = self.begin().await?;

        permissions::require_admin(&mut tx, group_id, acting_user_id).await?;

        let target = group_queries::find_group_member(&mut tx, group_id, target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("User is not a member of this group")))?;
        if target.is_admin() {
            return Err(AppError::Conflict(
                ConflictReason::AlreadyAdmin,
                anyhow!("User is already an admin of this group"),
            ));
        }

        let member =
            group_queries::update_member_role(&mut tx, group_id, target_user_id, MemberRole::Admin)
                .await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("{} promoted to admin of group {}", target_user_id, group_id);
        Ok(member)
    }

    pub async fn remove_member(
        &self,
        group_id: Uuid,
        acting_user_id: Uuid,
        target_user_id: Uuid,
    ) -> AppResult<()> {
        let mut tx = self.begin().await?;

        permissions::require_admin(&mut tx, group_id, acting_user_id).await?;

        let target = group_queries::find_group_member(&mut tx, group_id, target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("User is not a member of this group")))?;

        // Removing the last admin would leave the group unmanageable.
        if target.is_admin() && group_queries::count_admins(&mut tx, group_id).await? <= 1 {
            return Err(AppError::Conflict(
                ConflictReason::LastAdmin,
                anyhow!("Cannot remove the only admin of this group"),
            ));
        }

        group_queries::delete_group_member(&mut tx, group_id, target_user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("{} removed from group {}", target_user_id, group_id);
        Ok(())
    }

    /// Members leave freely. The sole admin of a populated group must hand
    /// over first; the last remaining member takes the group down with them.
    pub async fn leave_group(&self, group_id: Uuid, acting_user_id: Uuid) -> AppResult<()> {
        let mut tx = self.begin().await?;

        let member = group_queries::find_group_member(&mut tx, group_id, acting_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("You are not a member of this group")))?;

        if member.is_admin() {
            let total = group_queries::count_members(&mut tx, group_id).await?;
            if total == 1 {
                group_queries::delete_group(&mut tx, group_id).await?;
                tx.commit().await.map_err(|e| {
                    AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
                })?;
                log::info!("group {} deleted after its last member left", group_id);
                return Ok(());
            }
            if group_queries::count_admins(&mut tx, group_id).await? <= 1 {
                return Err(AppError::Conflict(
                    ConflictReason::MustPromoteFirst,
                    anyhow!("Promote another admin before leaving the group"),
                ));
            }
        }

        group_queries::delete_group_member(&mut tx, group_id, acting_user_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::InternalServerError(anyhow!("Failed to commit transaction: {}", e))
        })?;

        log::info!("{} left group {}", acting_user_id, group_id);
        Ok(())
    }

    pub async fn list_groups(&self, user_id: Uuid) -> AppResult<Vec<Group>> {
        let mut conn = self.acquire().await?;
        group_queries::list_groups_for_user(&mut conn, user_id).await
    }

    pub async fn list_members(
        &self,
        group_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<Vec<GroupMember>> {
        let mut conn = self.acquire().await?;
        permissions::require_member(&mut conn, group_id, acting_user_id).await?;
        group_queries::list_group_members(&mut conn, group_id).await
    }

    /// The acting user's own invitation inbox.
    pub async fn list_pending_invitations(&self, user_id: Uuid) -> AppResult<Vec<GroupInvitation>> {
        let mut conn = self.acquire().await?;
        invitation_queries::list_pending_invitations_for_user(&mut conn, user_id).await
    }

    pub async fn list_group_invitations(
        &self,
        group_id: Uuid,
        acting_user_id: Uuid,
    ) -> AppResult<Vec<GroupInvitation>> {
        let mut conn = self.acquire().await?;
        permissions::require_admin(&mut conn, group_id, acting_user_id).await?;
        invitation_queries::list_pending_invitations_for_group(&mut conn, group_id).await
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
