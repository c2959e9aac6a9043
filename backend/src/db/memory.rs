use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, StreakScope, StreakStore, TaskScope, TaskStore};
use crate::models::{StreakRecord, StreakUpdate};
use shared::{DailyTask, TaskStatus};

/// In-memory store for engine tests
#[derive(Default)]
pub struct MemoryStore {
    streaks: Mutex<HashMap<Uuid, StreakRecord>>,
    /// Owner timezones for streaks created through the store; unknown owners are in UTC
    timezones: Mutex<HashMap<Uuid, String>>,
    tasks: Mutex<Vec<DailyTask>>,
    /// Number of upcoming streak updates that lose a race against another writer
    conflicts: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_streak(&self, record: StreakRecord) {
        self.streaks.lock().unwrap().insert(record.id, record);
    }

    pub fn set_timezone(&self, user_id: Uuid, timezone: &str) {
        self.timezones.lock().unwrap().insert(user_id, timezone.to_string());
    }

    pub fn insert_task(&self, task: DailyTask) {
        self.tasks.lock().unwrap().push(task);
    }

    /// Make the next `count` updates behave as if another writer bumped the version first
    pub fn inject_conflicts(&self, count: u32) {
        *self.conflicts.lock().unwrap() = count;
    }
}

#[async_trait]
impl StreakStore for MemoryStore {
    async fn find_streak(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<StreakRecord>, StoreError> {
        let streaks = self.streaks.lock().unwrap();
        Ok(streaks
            .values()
            .find(|s| s.user_id == user_id && s.group_id == group_id)
            .cloned())
    }

    async fn create_streak(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError> {
        let mut streaks = self.streaks.lock().unwrap();
        if let Some(existing) = streaks
            .values()
            .find(|s| s.user_id == user_id && s.group_id == group_id)
        {
            return Ok(existing.clone());
        }

        let record = StreakRecord {
            id: Uuid::new_v4(),
            group_id,
            user_id,
            current_streak: 0,
            best_streak: 0,
            last_task_date: None,
            version: 0,
            updated_at: now,
            timezone: self
                .timezones
                .lock()
                .unwrap()
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| "UTC".to_string()),
        };
        streaks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_streak(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &StreakUpdate,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError> {
        let mut streaks = self.streaks.lock().unwrap();
        let record = streaks.get_mut(&id).ok_or(StoreError::NotFound)?;

        let mut conflicts = self.conflicts.lock().unwrap();
        if *conflicts > 0 {
            *conflicts -= 1;
            record.version += 1;
            return Err(StoreError::ConcurrentModification);
        }

        if record.version != expected_version {
            return Err(StoreError::ConcurrentModification);
        }
        record.current_streak = update.current_streak;
        record.best_streak = update.best_streak;
        record.last_task_date = update.last_task_date;
        record.version += 1;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn list_streaks(&self, scope: StreakScope) -> Result<Vec<StreakRecord>, StoreError> {
        let streaks = self.streaks.lock().unwrap();
        let mut matching: Vec<StreakRecord> = streaks
            .values()
            .filter(|s| match scope {
                StreakScope::User(user_id) => s.user_id == user_id,
                StreakScope::Group(group_id) => s.group_id == group_id,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.current_streak
                .cmp(&a.current_streak)
                .then(b.best_streak.cmp(&a.best_streak))
        });
        Ok(matching)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find_tasks_by_status(
        &self,
        scope: TaskScope,
        status: TaskStatus,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<DailyTask>, StoreError> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<DailyTask> = tasks
            .iter()
            .filter(|t| match scope {
                TaskScope::UserInGroup { user_id, group_id } => {
                    t.user_id == user_id && t.group_id == group_id
                }
                TaskScope::User(user_id) => t.user_id == user_id,
            })
            .filter(|t| t.status == status && t.date < due_before)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.date);
        Ok(matching)
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DailyTask>, StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = match tasks.iter_mut().find(|t| t.id == task_id && t.status == from) {
            Some(task) => task,
            None => return Ok(None),
        };
        task.status = to;
        task.completed_at = completed_at;
        task.updated_at = now;
        Ok(Some(task.clone()))
    }
}
