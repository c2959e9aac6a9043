use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{StoreError, StreakScope, StreakStore, TaskScope, TaskStore};
use crate::models::{StreakRecord, StreakRow, StreakUpdate, TaskRow};
use shared::{DailyTask, TaskStatus};

const STREAK_SELECT: &str = r#"
    SELECT s.id, s.group_id, s.user_id, s.current_streak, s.best_streak, s.last_task_date,
           s.version, s.created_at, s.updated_at, u.timezone
    FROM streaks s
    JOIN users u ON u.id = s.user_id
"#;

/// Store backed by the application's SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn streak_by_id(&self, id: Uuid) -> Result<Option<StreakRecord>, StoreError> {
        let sql = format!("{} WHERE s.id = ?", STREAK_SELECT);
        let row: Option<StreakRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.to_record()).transpose()?)
    }
}

#[async_trait]
impl StreakStore for SqliteStore {
    async fn find_streak(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<StreakRecord>, StoreError> {
        let sql = format!("{} WHERE s.user_id = ? AND s.group_id = ?", STREAK_SELECT);
        let row: Option<StreakRow> = sqlx::query_as(&sql)
            .bind(user_id.to_string())
            .bind(group_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.to_record()).transpose()?)
    }

    async fn create_streak(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO streaks (id, group_id, user_id, current_streak, best_streak, last_task_date, version, created_at, updated_at)
            VALUES (?, ?, ?, 0, 0, NULL, 0, ?, ?)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(group_id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_streak(user_id, group_id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update_streak(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &StreakUpdate,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE streaks
            SET current_streak = ?, best_streak = ?, last_task_date = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(update.current_streak as i64)
        .bind(update.best_streak as i64)
        .bind(update.last_task_date)
        .bind(now)
        .bind(id.to_string())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        let current = self.streak_by_id(id).await?.ok_or(StoreError::NotFound)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrentModification);
        }
        Ok(current)
    }

    async fn list_streaks(&self, scope: StreakScope) -> Result<Vec<StreakRecord>, StoreError> {
        let (column, id) = match scope {
            StreakScope::User(user_id) => ("s.user_id", user_id),
            StreakScope::Group(group_id) => ("s.group_id", group_id),
        };
        let sql = format!(
            "{} WHERE {} = ? ORDER BY s.current_streak DESC, s.best_streak DESC",
            STREAK_SELECT, column
        );

        let rows: Vec<StreakRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.to_record()).collect::<Result<_, _>>()?)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find_tasks_by_status(
        &self,
        scope: TaskScope,
        status: TaskStatus,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<DailyTask>, StoreError> {
        let rows: Vec<TaskRow> = match scope {
            TaskScope::UserInGroup { user_id, group_id } => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM daily_tasks
                    WHERE user_id = ? AND group_id = ? AND status = ? AND date < ?
                    ORDER BY date ASC
                    "#,
                )
                .bind(user_id.to_string())
                .bind(group_id.to_string())
                .bind(status.as_str())
                .bind(due_before)
                .fetch_all(&self.pool)
                .await?
            }
            TaskScope::User(user_id) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM daily_tasks
                    WHERE user_id = ? AND status = ? AND date < ?
                    ORDER BY date ASC
                    "#,
                )
                .bind(user_id.to_string())
                .bind(status.as_str())
                .bind(due_before)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DailyTask>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            UPDATE daily_tasks
            SET status = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(completed_at)
        .bind(now)
        .bind(task_id.to_string())
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.to_shared()).transpose()?)
    }
}
