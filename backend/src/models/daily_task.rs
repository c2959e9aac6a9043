use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_enum, parse_id, user_summary};

/// Database model for daily tasks
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub fn to_shared(&self) -> Result<shared::DailyTask, sqlx::Error> {
        Ok(shared::DailyTask {
            id: parse_id(&self.id)?,
            group_id: parse_id(&self.group_id)?,
            user_id: parse_id(&self.user_id)?,
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.date,
            status: parse_enum(&self.status, "task status")?,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database model for daily tasks with the owner's info (for JOIN queries)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskWithUserRow {
    // Task fields
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // User fields
    pub user_name: String,
    pub user_email: String,
}

impl TaskWithUserRow {
    pub fn to_shared(&self) -> Result<shared::TaskWithUser, sqlx::Error> {
        Ok(shared::TaskWithUser {
            task: shared::DailyTask {
                id: parse_id(&self.id)?,
                group_id: parse_id(&self.group_id)?,
                user_id: parse_id(&self.user_id)?,
                title: self.title.clone(),
                description: self.description.clone(),
                date: self.date,
                status: parse_enum(&self.status, "task status")?,
                completed_at: self.completed_at,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            user: user_summary(&self.user_id, &self.user_name, &self.user_email)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::TaskStatus;
    use uuid::Uuid;

    fn row(status: &str) -> TaskRow {
        let now = Utc::now();
        TaskRow {
            id: Uuid::new_v4().to_string(),
            group_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            title: "Run 5k".to_string(),
            description: None,
            date: Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
            status: status.to_string(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_task_row_to_shared() {
        let task = row("completed").to_shared().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.date, Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap());
        assert_eq!(task.title, "Run 5k");
    }

    #[test]
    fn test_task_row_unknown_status_is_rejected() {
        let result = row("snoozed").to_shared();
        assert!(matches!(result, Err(sqlx::Error::Decode(_))));
    }

    #[test]
    fn test_task_with_user_row() {
        let base = row("missed");
        let with_user = TaskWithUserRow {
            id: base.id.clone(),
            group_id: base.group_id.clone(),
            user_id: base.user_id.clone(),
            title: base.title.clone(),
            description: Some("Along the river".to_string()),
            date: base.date,
            status: base.status.clone(),
            completed_at: None,
            created_at: base.created_at,
            updated_at: base.updated_at,
            user_name: "Ada".to_string(),
            user_email: "ada@example.com".to_string(),
        };

        let shared = with_user.to_shared().unwrap();
        assert_eq!(shared.task.status, TaskStatus::Missed);
        assert_eq!(shared.user.id, shared.task.user_id);
        assert_eq!(shared.user.name, "Ada");
    }
}
