use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{StoreError, TaskScope, TaskStore};
use crate::services::calendar::Calendar;
use shared::{DailyTask, PendingTask, TaskStatus};

/// A task is pending once its whole calendar day has passed without a completion or miss.
/// A task due today is never pending.
pub fn is_pending(task: &DailyTask, calendar: &Calendar, now: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Pending && task.date < calendar.start_of_day(now)
}

pub async fn pending_count(
    store: &dyn TaskStore,
    user_id: Uuid,
    group_id: Uuid,
    calendar: &Calendar,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let scope = TaskScope::UserInGroup { user_id, group_id };
    Ok(pending_tasks_with_age(store, scope, calendar, now).await?.len())
}

/// Pending tasks in `scope`, oldest first, each with the number of days it is overdue
pub async fn pending_tasks_with_age(
    store: &dyn TaskStore,
    scope: TaskScope,
    calendar: &Calendar,
    now: DateTime<Utc>,
) -> Result<Vec<PendingTask>, StoreError> {
    let today = calendar.start_of_day(now);
    let tasks = store
        .find_tasks_by_status(scope, TaskStatus::Pending, today)
        .await?;

    Ok(tasks
        .into_iter()
        .filter(|task| is_pending(task, calendar, now))
        .map(|task| PendingTask {
            days_pending: calendar.days_pending(task.date, now),
            task,
        })
        .collect())
}
