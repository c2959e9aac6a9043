use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{encode_json_list, GoalWithUserRow};
use shared::{CreateGoalRequest, GoalStatus, GoalWithUser, UpdateGoalRequest};

#[derive(Debug, Error)]
pub enum GoalError {
    #[error("Goal not found")]
    NotFound,
    #[error("You can only change your own goals")]
    NotOwner,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

const GOAL_WITH_USER_SELECT: &str = r#"
    SELECT g.id, g.group_id, g.user_id, g.title, g.description, g.goal_type, g.items,
           g.start_date, g.end_date, g.milestones, g.status, g.created_at, g.updated_at,
           u.name AS user_name, u.email AS user_email
    FROM goals g
    JOIN users u ON u.id = g.user_id
"#;

pub async fn create_goal(
    pool: &SqlitePool,
    group_id: &Uuid,
    user_id: &Uuid,
    request: &CreateGoalRequest,
) -> Result<GoalWithUser, GoalError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let items = request.items.as_deref().map(encode_json_list).transpose()?;
    let milestones = request.milestones.as_deref().map(encode_json_list).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO goals (id, group_id, user_id, title, description, goal_type, items,
                           start_date, end_date, milestones, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind(request.title.trim())
    .bind(&request.description)
    .bind(request.goal_type.as_str())
    .bind(items)
    .bind(request.start_date)
    .bind(request.end_date)
    .bind(milestones)
    .bind(GoalStatus::Active.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_goal(pool, &id).await?.ok_or(GoalError::NotFound)
}

pub async fn get_goal(pool: &SqlitePool, goal_id: &Uuid) -> Result<Option<GoalWithUser>, GoalError> {
    let sql = format!("{} WHERE g.id = ?", GOAL_WITH_USER_SELECT);
    let row: Option<GoalWithUserRow> = sqlx::query_as(&sql)
        .bind(goal_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}

/// Goals of a group, newest first
pub async fn list_group_goals(pool: &SqlitePool, group_id: &Uuid) -> Result<Vec<GoalWithUser>, GoalError> {
    let sql = format!(
        "{} WHERE g.group_id = ? ORDER BY g.created_at DESC",
        GOAL_WITH_USER_SELECT
    );
    let rows: Vec<GoalWithUserRow> = sqlx::query_as(&sql)
        .bind(group_id.to_string())
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

async fn owned_goal(pool: &SqlitePool, goal_id: &Uuid, user_id: &Uuid) -> Result<GoalWithUser, GoalError> {
    let goal = get_goal(pool, goal_id).await?.ok_or(GoalError::NotFound)?;
    if goal.goal.user_id != *user_id {
        return Err(GoalError::NotOwner);
    }
    Ok(goal)
}

/// Update the caller's own goal. Absent fields keep their stored value.
pub async fn update_goal(
    pool: &SqlitePool,
    goal_id: &Uuid,
    user_id: &Uuid,
    request: &UpdateGoalRequest,
) -> Result<GoalWithUser, GoalError> {
    let mut goal = owned_goal(pool, goal_id, user_id).await?.goal;

    if let Some(ref title) = request.title {
        goal.title = title.trim().to_string();
    }
    if let Some(ref description) = request.description {
        goal.description = Some(description.clone());
    }
    if let Some(ref items) = request.items {
        goal.items = items.clone();
    }
    if let Some(ref milestones) = request.milestones {
        goal.milestones = milestones.clone();
    }
    if request.start_date.is_some() {
        goal.start_date = request.start_date;
    }
    if request.end_date.is_some() {
        goal.end_date = request.end_date;
    }
    if let Some(status) = request.status {
        goal.status = status;
    }

    sqlx::query(
        r#"
        UPDATE goals
        SET title = ?, description = ?, items = ?, start_date = ?, end_date = ?,
            milestones = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(encode_json_list(&goal.items)?)
    .bind(goal.start_date)
    .bind(goal.end_date)
    .bind(encode_json_list(&goal.milestones)?)
    .bind(goal.status.as_str())
    .bind(Utc::now())
    .bind(goal_id.to_string())
    .execute(pool)
    .await?;

    get_goal(pool, goal_id).await?.ok_or(GoalError::NotFound)
}

pub async fn delete_goal(pool: &SqlitePool, goal_id: &Uuid, user_id: &Uuid) -> Result<(), GoalError> {
    owned_goal(pool, goal_id, user_id).await?;

    sqlx::query("DELETE FROM goals WHERE id = ?")
        .bind(goal_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
