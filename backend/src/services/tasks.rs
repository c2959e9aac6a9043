use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{StoreError, StreakStore, TaskStore};
use crate::models::{TaskRow, TaskWithUserRow};
use crate::services::auth::Session;
use crate::services::streaks::{self, StreakError};
use shared::{CreateTaskRequest, DailyTask, TaskStatus, TaskWithUser, UpdateTaskRequest};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found")]
    NotFound,
    #[error("You can only change your own tasks")]
    NotOwner,
    #[error("You have already posted a task for this date in this group")]
    AlreadyExists,
    #[error("The task's day has already passed")]
    DayPassed,
    #[error("The task's status was changed at the same time")]
    StatusConflict,
    #[error("Streak error: {0}")]
    StreakError(#[from] StreakError),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Optional filters for a group's task list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    /// Any instant of the wanted day, in the caller's timezone
    pub date: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

const TASK_WITH_USER_SELECT: &str = r#"
    SELECT t.id, t.group_id, t.user_id, t.title, t.description, t.date, t.status,
           t.completed_at, t.created_at, t.updated_at,
           u.name AS user_name, u.email AS user_email
    FROM daily_tasks t
    JOIN users u ON u.id = t.user_id
"#;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Post the caller's task for a day. The date is normalized to the start of that day in
/// the caller's timezone, and only one task per user, group and day is allowed.
pub async fn create_task(
    pool: &SqlitePool,
    group_id: &Uuid,
    session: &Session,
    request: &CreateTaskRequest,
    now: DateTime<Utc>,
) -> Result<TaskWithUser, TaskError> {
    let id = Uuid::new_v4();
    let date = session.calendar.start_of_day(request.date);

    let result = sqlx::query(
        r#"
        INSERT INTO daily_tasks (id, group_id, user_id, title, description, date, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(group_id.to_string())
    .bind(session.user_id.to_string())
    .bind(request.title.trim())
    .bind(&request.description)
    .bind(date)
    .bind(TaskStatus::Pending.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Err(TaskError::AlreadyExists),
        Err(e) => return Err(e.into()),
    }

    get_task_with_user(pool, &id).await?.ok_or(TaskError::NotFound)
}

pub async fn get_task(pool: &SqlitePool, task_id: &Uuid) -> Result<Option<DailyTask>, TaskError> {
    let task: Option<TaskRow> = sqlx::query_as("SELECT * FROM daily_tasks WHERE id = ?")
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(task.map(|t| t.to_shared()).transpose()?)
}

async fn get_task_with_user(pool: &SqlitePool, task_id: &Uuid) -> Result<Option<TaskWithUser>, TaskError> {
    let sql = format!("{} WHERE t.id = ?", TASK_WITH_USER_SELECT);
    let row: Option<TaskWithUserRow> = sqlx::query_as(&sql)
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()).transpose()?)
}

/// Tasks of a group, newest day first
pub async fn list_group_tasks(
    pool: &SqlitePool,
    group_id: &Uuid,
    filter: &TaskFilter,
    session: &Session,
) -> Result<Vec<TaskWithUser>, TaskError> {
    let date = filter.date.map(|d| session.calendar.start_of_day(d));
    let sql = format!(
        r#"{}
        WHERE t.group_id = ?1
          AND (?2 IS NULL OR t.date = ?2)
          AND (?3 IS NULL OR t.user_id = ?3)
          AND (?4 IS NULL OR t.status = ?4)
        ORDER BY t.date DESC, t.created_at DESC
        "#,
        TASK_WITH_USER_SELECT
    );

    let rows: Vec<TaskWithUserRow> = sqlx::query_as(&sql)
        .bind(group_id.to_string())
        .bind(date)
        .bind(filter.user_id.map(|id| id.to_string()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.to_shared()).collect::<Result<_, _>>()?)
}

/// Update the caller's own task.
///
/// Title and description can only change while the task's day is still running. Status
/// changes are always allowed and drive the streak: completing extends it, missing
/// breaks it, and reopening leaves it alone.
pub async fn update_task<S>(
    pool: &SqlitePool,
    store: &S,
    task_id: &Uuid,
    session: &Session,
    request: &UpdateTaskRequest,
    now: DateTime<Utc>,
) -> Result<TaskWithUser, TaskError>
where
    S: StreakStore + TaskStore,
{
    let task = get_task(pool, task_id).await?.ok_or(TaskError::NotFound)?;
    if task.user_id != session.user_id {
        return Err(TaskError::NotOwner);
    }

    let today = session.calendar.start_of_day(now);
    if request.edits_details() && task.date < today {
        return Err(TaskError::DayPassed);
    }

    if let Some(status) = request.status.filter(|s| *s != task.status) {
        change_status(pool, store, &task, status, session, now).await?;
    }

    if request.edits_details() {
        sqlx::query(
            r#"
            UPDATE daily_tasks
            SET title = COALESCE(?, title), description = COALESCE(?, description), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.title.as_deref().map(str::trim))
        .bind(&request.description)
        .bind(now)
        .bind(task_id.to_string())
        .execute(pool)
        .await?;
    }

    get_task_with_user(pool, task_id).await?.ok_or(TaskError::NotFound)
}

/// Claim the status transition, then apply its streak effect.
///
/// Only the writer whose conditional update moves the task off its old status touches the
/// streak. A loser that asked for the status the task now has is a no-op. If the streak
/// write fails the claim is rolled back.
async fn change_status<S>(
    pool: &SqlitePool,
    store: &S,
    task: &DailyTask,
    status: TaskStatus,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<(), TaskError>
where
    S: StreakStore + TaskStore,
{
    let completed_at = (status == TaskStatus::Completed).then_some(now);
    let claimed = store
        .update_task_status(task.id, task.status, status, completed_at, now)
        .await?;

    if claimed.is_none() {
        let current = get_task(pool, &task.id).await?.ok_or(TaskError::NotFound)?;
        if current.status == status {
            log::debug!("Task {} already moved to {}", task.id, status.as_str());
            return Ok(());
        }
        return Err(TaskError::StatusConflict);
    }

    let effect = match status {
        TaskStatus::Completed => streaks::record_completion(
            store,
            task.user_id,
            task.group_id,
            task.date,
            &session.calendar,
            now,
        )
        .await
        .map(|_| ()),
        TaskStatus::Missed => streaks::break_streak(store, task.user_id, task.group_id, now)
            .await
            .map(|_| ()),
        TaskStatus::Pending => Ok(()),
    };

    if let Err(e) = effect {
        if let Err(revert) = store
            .update_task_status(task.id, status, task.status, task.completed_at, now)
            .await
        {
            log::error!("Could not restore status of task {}: {:?}", task.id, revert);
        }
        return Err(e.into());
    }

    log::debug!("Task {} moved from {} to {}", task.id, task.status.as_str(), status.as_str());
    Ok(())
}

/// Delete the caller's own task, only on its own day
pub async fn delete_task(
    pool: &SqlitePool,
    task_id: &Uuid,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<(), TaskError> {
    let task = get_task(pool, task_id).await?.ok_or(TaskError::NotFound)?;
    if task.user_id != session.user_id {
        return Err(TaskError::NotOwner);
    }
    if task.date < session.calendar.start_of_day(now) {
        return Err(TaskError::DayPassed);
    }

    sqlx::query("DELETE FROM daily_tasks WHERE id = ?")
        .bind(task_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteStore, TaskScope};
    use crate::services::calendar::Calendar;
    use crate::services::groups::tests::{create_test_group, create_test_user, setup_test_db};
    use crate::services::pending_tasks;
    use chrono::{Duration, NaiveDate, TimeZone};

    struct Fixture {
        pool: SqlitePool,
        store: SqliteStore,
        session: Session,
        group_id: Uuid,
    }

    async fn fixture(timezone: &str) -> Fixture {
        let pool = setup_test_db().await;
        let user_id = create_test_user(&pool, "Ada", timezone).await;
        let group = create_test_group(&pool, &user_id, "Runners").await;
        Fixture {
            store: SqliteStore::new(pool.clone()),
            pool,
            session: Session {
                user_id,
                calendar: Calendar::new(timezone).unwrap(),
            },
            group_id: group.id,
        }
    }

    fn create_request(date: DateTime<Utc>) -> CreateTaskRequest {
        CreateTaskRequest {
            title: "Run 5k".to_string(),
            description: None,
            date,
        }
    }

    fn status_update(status: TaskStatus) -> UpdateTaskRequest {
        UpdateTaskRequest {
            status: Some(status),
            ..Default::default()
        }
    }

    fn local_day(calendar: &Calendar, y: i32, m: u32, d: u32) -> DateTime<Utc> {
        calendar.start_of_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[tokio::test]
    async fn test_create_task_normalizes_and_is_unique_per_day() {
        let f = fixture("America/New_York").await;
        // Evening of Jan 1 in New York
        let evening = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();

        let created = create_task(&f.pool, &f.group_id, &f.session, &create_request(evening), evening)
            .await
            .unwrap();
        assert_eq!(created.task.date, Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap());
        assert_eq!(created.task.status, TaskStatus::Pending);
        assert_eq!(created.user.id, f.session.user_id);

        let morning = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        let duplicate = create_task(&f.pool, &f.group_id, &f.session, &create_request(morning), morning).await;
        assert!(matches!(duplicate, Err(TaskError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_status_changes_drive_streak() {
        let f = fixture("America/New_York").await;
        let cal = f.session.calendar;

        let mut last = None;
        for day in 1..=3 {
            let d = local_day(&cal, 2024, 1, day) + Duration::hours(8);
            let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(d), d).await.unwrap();
            let done = update_task(&f.pool, &f.store, &task.task.id, &f.session, &status_update(TaskStatus::Completed), d + Duration::hours(10))
                .await
                .unwrap();
            assert_eq!(done.task.completed_at, Some(d + Duration::hours(10)));
            last = Some(done);
        }

        let streak = streaks::get_streak(&f.store, f.session.user_id, f.group_id).await.unwrap().unwrap();
        assert_eq!((streak.current_streak, streak.best_streak), (3, 3));

        // Reopening does not touch the streak but clears the completion time
        let reopened = update_task(&f.pool, &f.store, &last.unwrap().task.id, &f.session, &status_update(TaskStatus::Pending), Utc::now())
            .await
            .unwrap();
        assert_eq!(reopened.task.completed_at, None);
        let streak = streaks::get_streak(&f.store, f.session.user_id, f.group_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 3);

        let d5 = local_day(&cal, 2024, 1, 5) + Duration::hours(9);
        let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(d5), d5).await.unwrap();
        let missed = update_task(&f.pool, &f.store, &task.task.id, &f.session, &status_update(TaskStatus::Missed), d5)
            .await
            .unwrap();
        assert_eq!(missed.task.status, TaskStatus::Missed);

        let streak = streaks::get_streak(&f.store, f.session.user_id, f.group_id).await.unwrap().unwrap();
        assert_eq!((streak.current_streak, streak.best_streak), (0, 3));
    }

    #[tokio::test]
    async fn test_simultaneous_completions_count_once() {
        let f = fixture("UTC").await;
        let cal = f.session.calendar;

        for day in 1..=2 {
            let d = local_day(&cal, 2024, 6, day) + Duration::hours(8);
            let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(d), d).await.unwrap();
            update_task(&f.pool, &f.store, &task.task.id, &f.session, &status_update(TaskStatus::Completed), d)
                .await
                .unwrap();
        }

        let d3 = local_day(&cal, 2024, 6, 3) + Duration::hours(8);
        let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(d3), d3).await.unwrap();
        let complete = status_update(TaskStatus::Completed);
        let (first, second) = tokio::join!(
            update_task(&f.pool, &f.store, &task.task.id, &f.session, &complete, d3),
            update_task(&f.pool, &f.store, &task.task.id, &f.session, &complete, d3),
        );
        assert_eq!(first.unwrap().task.status, TaskStatus::Completed);
        assert_eq!(second.unwrap().task.status, TaskStatus::Completed);

        let streak = streaks::get_streak(&f.store, f.session.user_id, f.group_id).await.unwrap().unwrap();
        assert_eq!((streak.current_streak, streak.best_streak), (3, 3));
    }

    #[tokio::test]
    async fn test_status_change_from_stale_read() {
        let f = fixture("UTC").await;
        let d = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let created = create_task(&f.pool, &f.group_id, &f.session, &create_request(d), d).await.unwrap();
        let stale = created.task.clone();

        update_task(&f.pool, &f.store, &stale.id, &f.session, &status_update(TaskStatus::Missed), d)
            .await
            .unwrap();

        // Asking for the status the task already reached is a no-op
        change_status(&f.pool, &f.store, &stale, TaskStatus::Missed, &f.session, d).await.unwrap();

        let result = change_status(&f.pool, &f.store, &stale, TaskStatus::Completed, &f.session, d).await;
        assert!(matches!(result, Err(TaskError::StatusConflict)));
        assert_eq!(get_task(&f.pool, &stale.id).await.unwrap().unwrap().status, TaskStatus::Missed);
        assert!(streaks::get_streak(&f.store, f.session.user_id, f.group_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_details_locked_after_day_passes() {
        let f = fixture("UTC").await;
        let day = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(day), day).await.unwrap();

        let edit = UpdateTaskRequest {
            title: Some("Run 10k".to_string()),
            ..Default::default()
        };
        let same_day = update_task(&f.pool, &f.store, &task.task.id, &f.session, &edit, day + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(same_day.task.title, "Run 10k");

        let next_day = day + Duration::days(1);
        let late = update_task(&f.pool, &f.store, &task.task.id, &f.session, &edit, next_day).await;
        assert!(matches!(late, Err(TaskError::DayPassed)));

        // Status alone can still change
        let completed = update_task(&f.pool, &f.store, &task.task.id, &f.session, &status_update(TaskStatus::Completed), next_day)
            .await
            .unwrap();
        assert_eq!(completed.task.status, TaskStatus::Completed);

        assert!(matches!(
            delete_task(&f.pool, &task.task.id, &f.session, next_day).await,
            Err(TaskError::DayPassed)
        ));
    }

    #[tokio::test]
    async fn test_only_owner_changes_task() {
        let f = fixture("UTC").await;
        let now = Utc::now();
        let task = create_task(&f.pool, &f.group_id, &f.session, &create_request(now), now).await.unwrap();
        let stranger = Session {
            user_id: create_test_user(&f.pool, "Mallory", "UTC").await,
            calendar: f.session.calendar,
        };

        let update = update_task(&f.pool, &f.store, &task.task.id, &stranger, &status_update(TaskStatus::Completed), now).await;
        assert!(matches!(update, Err(TaskError::NotOwner)));
        assert!(matches!(
            delete_task(&f.pool, &task.task.id, &stranger, now).await,
            Err(TaskError::NotOwner)
        ));

        delete_task(&f.pool, &task.task.id, &f.session, now).await.unwrap();
        assert!(get_task(&f.pool, &task.task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_group_tasks_filters() {
        let f = fixture("America/New_York").await;
        let cal = f.session.calendar;
        for day in 1..=3 {
            let d = local_day(&cal, 2024, 2, day) + Duration::hours(12);
            create_task(&f.pool, &f.group_id, &f.session, &create_request(d), d).await.unwrap();
        }

        let all = list_group_tasks(&f.pool, &f.group_id, &TaskFilter::default(), &f.session).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].task.date > all[2].task.date);

        let by_day = TaskFilter {
            date: Some(local_day(&cal, 2024, 2, 2) + Duration::hours(20)),
            ..Default::default()
        };
        let filtered = list_group_tasks(&f.pool, &f.group_id, &by_day, &f.session).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].task.date, local_day(&cal, 2024, 2, 2));

        let completed = TaskFilter {
            status: Some(TaskStatus::Completed),
            user_id: Some(f.session.user_id),
            ..Default::default()
        };
        assert!(list_group_tasks(&f.pool, &f.group_id, &completed, &f.session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_scenario_against_sqlite() {
        let f = fixture("America/New_York").await;
        let cal = f.session.calendar;
        let due = local_day(&cal, 2024, 1, 1) + Duration::hours(7);
        create_task(&f.pool, &f.group_id, &f.session, &create_request(due), due).await.unwrap();

        let jan_4 = local_day(&cal, 2024, 1, 4) + Duration::hours(12);
        let scope = TaskScope::UserInGroup { user_id: f.session.user_id, group_id: f.group_id };
        let pending = pending_tasks::pending_tasks_with_age(&f.store, scope, &cal, jan_4).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].days_pending, 3);

        let same_day = pending_tasks::pending_count(&f.store, f.session.user_id, f.group_id, &cal, due).await.unwrap();
        assert_eq!(same_day, 0);
    }
}
