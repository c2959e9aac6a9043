use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::JoinRequestWithUserRow;
use crate::services::groups::{self, GroupError};
use shared::{GroupRole, JoinRequestAction, JoinRequestStatus, JoinRequestWithUser};

#[derive(Debug, Error)]
pub enum JoinRequestError {
    #[error("Group not found")]
    GroupNotFound,
    #[error("Join request not found")]
    NotFound,
    #[error("Already a member of this group")]
    AlreadyMember,
    #[error("Join request already exists")]
    AlreadyRequested,
    #[error("Join request was already handled")]
    AlreadyHandled,
    #[error("Group error: {0}")]
    GroupError(#[from] GroupError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

const REQUEST_WITH_USER_SELECT: &str = r#"
    SELECT r.id, r.group_id, r.user_id, r.message, r.status, r.created_at, r.updated_at,
           u.name AS user_name, u.email AS user_email
    FROM join_requests r
    JOIN users u ON u.id = r.user_id
"#;

/// Ask to join a group. A user gets one request per group, whatever its outcome.
pub async fn create_join_request(
    pool: &SqlitePool,
    group_id: &Uuid,
    user_id: &Uuid,
    message: Option<&str>,
) -> Result<JoinRequestWithUser, JoinRequestError> {
    if groups::get_group(pool, group_id).await?.is_none() {
        return Err(JoinRequestError::GroupNotFound);
    }
    if groups::get_member_role(pool, group_id, user_id).await?.is_some() {
        return Err(JoinRequestError::AlreadyMember);
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO join_requests (id, group_id, user_id, message, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind(message.map(str::trim).filter(|m| !m.is_empty()))
    .bind(JoinRequestStatus::Pending.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(JoinRequestError::AlreadyRequested);
    }

    log::info!("User {} requested to join group {}", user_id, group_id);
    get_join_request(pool, &id).await?.ok_or(JoinRequestError::NotFound)
}

async fn get_join_request(pool: &SqlitePool, request_id: &Uuid) -> Result<Option<JoinRequestWithUser>, JoinRequestError> {
    let sql = format!("{} WHERE r.id = ?", REQUEST_WITH_USER_SELECT);
    let row: Option<JoinRequestWithUserRow> = sqlx::query_as(&sql)
        .bind(request_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}

/// Pending requests of a group, newest first
pub async fn list_pending_requests(
    pool: &SqlitePool,
    group_id: &Uuid,
) -> Result<Vec<JoinRequestWithUser>, JoinRequestError> {
    let sql = format!(
        "{} WHERE r.group_id = ? AND r.status = ? ORDER BY r.created_at DESC",
        REQUEST_WITH_USER_SELECT
    );
    let rows: Vec<JoinRequestWithUserRow> = sqlx::query_as(&sql)
        .bind(group_id.to_string())
        .bind(JoinRequestStatus::Pending.as_str())
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

/// Approve or reject a pending request. Approval adds the requester as a member.
pub async fn handle_join_request(
    pool: &SqlitePool,
    group_id: &Uuid,
    request_id: &Uuid,
    action: JoinRequestAction,
) -> Result<JoinRequestStatus, JoinRequestError> {
    let request = get_join_request(pool, request_id)
        .await?
        .filter(|r| r.request.group_id == *group_id)
        .ok_or(JoinRequestError::NotFound)?;

    if request.request.status != JoinRequestStatus::Pending {
        return Err(JoinRequestError::AlreadyHandled);
    }

    let status = match action {
        JoinRequestAction::Approve => {
            groups::add_member(pool, group_id, &request.request.user_id, GroupRole::Member).await?;
            JoinRequestStatus::Approved
        }
        JoinRequestAction::Reject => JoinRequestStatus::Rejected,
    };

    sqlx::query("UPDATE join_requests SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(request_id.to_string())
        .execute(pool)
        .await?;

    log::info!(
        "Join request {} for group {} {}",
        request_id,
        group_id,
        status.as_str()
    );
    Ok(status)
}
