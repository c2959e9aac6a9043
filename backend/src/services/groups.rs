use chrono::Utc;
use rand::RngCore;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{GroupListingRow, GroupRow, MemberWithUserRow, MembershipRow};
use shared::{
    CreateGroupRequest, Group, GroupDetails, GroupRole, GroupWithRole, InvitePreview,
    MemberWithUser, PublicGroup, UpdateGroupRequest,
};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("Group not found")]
    NotFound,
    #[error("User is not a member of this group")]
    MemberNotFound,
    #[error("Cannot remove the group owner")]
    CannotRemoveOwner,
    #[error("Invalid or expired invite link")]
    InvalidInvite,
    #[error("Already a member of this group")]
    AlreadyMember(Uuid),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

const PUBLIC_GROUPS_LIMIT: i64 = 20;

/// Columns shared by every group listing: the group, its owner and its member count
const LISTING_COLUMNS: &str = r#"
    g.id, g.name, g.description, g.owner_id, g.invite_token, g.created_at, g.updated_at,
    u.name AS owner_name, u.email AS owner_email,
    (SELECT COUNT(*) FROM group_members c WHERE c.group_id = g.id) AS member_count
"#;

pub async fn create_group(
    pool: &SqlitePool,
    owner_id: &Uuid,
    request: &CreateGroupRequest,
) -> Result<Group, GroupError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let name = request.name.trim().to_string();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO accountability_groups (id, name, description, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(&request.description)
    .bind(owner_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // The creator administers the group
    sqlx::query(
        r#"
        INSERT INTO group_members (id, group_id, user_id, role, joined_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(id.to_string())
    .bind(owner_id.to_string())
    .bind(GroupRole::Admin.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!("Group {} created by {}", id, owner_id);

    Ok(Group {
        id,
        name,
        description: request.description.clone(),
        owner_id: *owner_id,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_group(pool: &SqlitePool, group_id: &Uuid) -> Result<Option<Group>, GroupError> {
    let group: Option<GroupRow> = sqlx::query_as("SELECT * FROM accountability_groups WHERE id = ?")
        .bind(group_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(group.map(|g| g.to_shared()).transpose()?)
}

/// Groups the user belongs to, in the order they joined them
pub async fn list_user_groups(pool: &SqlitePool, user_id: &Uuid) -> Result<Vec<GroupWithRole>, GroupError> {
    let sql = format!(
        r#"
        SELECT {}, m.role AS member_role, 0 AS has_pending_request
        FROM accountability_groups g
        JOIN group_members m ON m.group_id = g.id AND m.user_id = ?
        JOIN users u ON u.id = g.owner_id
        ORDER BY m.joined_at ASC
        "#,
        LISTING_COLUMNS
    );

    let rows: Vec<GroupListingRow> = sqlx::query_as(&sql)
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.to_with_role()).collect::<Result<_, _>>()?)
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Groups the user has not joined, newest first, optionally filtered by name or description
pub async fn browse_public_groups(
    pool: &SqlitePool,
    user_id: &Uuid,
    search: Option<&str>,
) -> Result<Vec<PublicGroup>, GroupError> {
    let search = search.map(str::trim).unwrap_or_default();
    let sql = format!(
        r#"
        SELECT {}, NULL AS member_role,
            EXISTS(
                SELECT 1 FROM join_requests r
                WHERE r.group_id = g.id AND r.user_id = ?1 AND r.status = 'pending'
            ) AS has_pending_request
        FROM accountability_groups g
        JOIN users u ON u.id = g.owner_id
        WHERE g.id NOT IN (SELECT group_id FROM group_members WHERE user_id = ?1)
          AND (?2 = '' OR g.name LIKE ?3 ESCAPE '\' OR g.description LIKE ?3 ESCAPE '\')
        ORDER BY g.created_at DESC
        LIMIT ?4
        "#,
        LISTING_COLUMNS
    );

    let rows: Vec<GroupListingRow> = sqlx::query_as(&sql)
        .bind(user_id.to_string())
        .bind(search)
        .bind(like_pattern(search))
        .bind(PUBLIC_GROUPS_LIMIT)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.to_public()).collect::<Result<_, _>>()?)
}

async fn get_listing(pool: &SqlitePool, where_clause: &str, value: &str) -> Result<Option<GroupListingRow>, GroupError> {
    let sql = format!(
        r#"
        SELECT {}, NULL AS member_role, 0 AS has_pending_request
        FROM accountability_groups g
        JOIN users u ON u.id = g.owner_id
        WHERE {}
        "#,
        LISTING_COLUMNS, where_clause
    );

    Ok(sqlx::query_as(&sql).bind(value).fetch_optional(pool).await?)
}

/// Full group page for a member. The invite token is only revealed to admins.
pub async fn get_group_details(
    pool: &SqlitePool,
    group_id: &Uuid,
    user_role: GroupRole,
) -> Result<GroupDetails, GroupError> {
    let listing = get_listing(pool, "g.id = ?", &group_id.to_string())
        .await?
        .ok_or(GroupError::NotFound)?;

    let members = list_members(pool, group_id).await?;

    let task_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM daily_tasks WHERE group_id = ?")
        .bind(group_id.to_string())
        .fetch_one(pool)
        .await?;

    let goal_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM goals WHERE group_id = ?")
        .bind(group_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(GroupDetails {
        group: listing.group()?,
        owner: listing.owner()?,
        members,
        task_count,
        goal_count,
        user_role,
        invite_token: if user_role.can_moderate() {
            listing.invite_token.clone()
        } else {
            None
        },
    })
}

pub async fn update_group(
    pool: &SqlitePool,
    group_id: &Uuid,
    request: &UpdateGroupRequest,
) -> Result<Group, GroupError> {
    let mut group: GroupRow = sqlx::query_as("SELECT * FROM accountability_groups WHERE id = ?")
        .bind(group_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or(GroupError::NotFound)?;

    if let Some(ref name) = request.name {
        group.name = name.trim().to_string();
    }
    if let Some(ref description) = request.description {
        group.description = Some(description.clone());
    }

    let now = Utc::now();
    group.updated_at = now;

    sqlx::query("UPDATE accountability_groups SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&group.name)
        .bind(&group.description)
        .bind(now)
        .bind(group_id.to_string())
        .execute(pool)
        .await?;

    Ok(group.to_shared()?)
}

/// Delete a group. Members, tasks, streaks, goals and join requests go with it.
pub async fn delete_group(pool: &SqlitePool, group_id: &Uuid) -> Result<(), GroupError> {
    let result = sqlx::query("DELETE FROM accountability_groups WHERE id = ?")
        .bind(group_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(GroupError::NotFound);
    }

    log::info!("Group {} deleted", group_id);
    Ok(())
}

pub async fn get_member_role(
    pool: &SqlitePool,
    group_id: &Uuid,
    user_id: &Uuid,
) -> Result<Option<GroupRole>, GroupError> {
    let membership: Option<MembershipRow> =
        sqlx::query_as("SELECT * FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(membership.map(|m| m.to_shared()).transpose()?.map(|m| m.role))
}

/// Members with their user info, oldest membership first
pub async fn list_members(pool: &SqlitePool, group_id: &Uuid) -> Result<Vec<MemberWithUser>, GroupError> {
    let rows: Vec<MemberWithUserRow> = sqlx::query_as(
        r#"
        SELECT m.id, m.group_id, m.user_id, m.role, m.joined_at,
               u.name AS user_name, u.email AS user_email
        FROM group_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.group_id = ?
        ORDER BY m.joined_at ASC
        "#,
    )
    .bind(group_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

/// Add a user to a group. Does nothing if they already are a member.
pub async fn add_member(
    pool: &SqlitePool,
    group_id: &Uuid,
    user_id: &Uuid,
    role: GroupRole,
) -> Result<(), GroupError> {
    sqlx::query(
        r#"
        INSERT INTO group_members (id, group_id, user_id, role, joined_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind(role.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove_member(pool: &SqlitePool, group_id: &Uuid, user_id: &Uuid) -> Result<(), GroupError> {
    let group = get_group(pool, group_id).await?.ok_or(GroupError::NotFound)?;
    if group.owner_id == *user_id {
        return Err(GroupError::CannotRemoveOwner);
    }

    let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
        .bind(group_id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(GroupError::MemberNotFound);
    }

    log::info!("User {} removed from group {}", user_id, group_id);
    Ok(())
}

fn new_invite_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Replace the group's invite token. Any previously shared link stops working.
pub async fn regenerate_invite_token(pool: &SqlitePool, group_id: &Uuid) -> Result<String, GroupError> {
    let token = new_invite_token();

    let result = sqlx::query("UPDATE accountability_groups SET invite_token = ?, updated_at = ? WHERE id = ?")
        .bind(&token)
        .bind(Utc::now())
        .bind(group_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(GroupError::NotFound);
    }

    Ok(token)
}

pub async fn preview_invite(pool: &SqlitePool, token: &str) -> Result<InvitePreview, GroupError> {
    let listing = get_listing(pool, "g.invite_token = ?", token)
        .await?
        .ok_or(GroupError::InvalidInvite)?;

    Ok(listing.to_preview()?)
}

/// Join the group behind an invite token as a regular member. Returns the group id.
pub async fn join_via_invite(pool: &SqlitePool, token: &str, user_id: &Uuid) -> Result<Uuid, GroupError> {
    let group: GroupRow = sqlx::query_as("SELECT * FROM accountability_groups WHERE invite_token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(GroupError::InvalidInvite)?;
    let group = group.to_shared()?;

    if get_member_role(pool, &group.id, user_id).await?.is_some() {
        return Err(GroupError::AlreadyMember(group.id));
    }

    add_member(pool, &group.id, user_id, GroupRole::Member).await?;
    log::info!("User {} joined group {} via invite", user_id, group.id);

    Ok(group.id)
}
