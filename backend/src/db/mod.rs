//! Persistence seam for the streak engine and the pending-task deriver.
//!
//! The engines only ever see these traits, so they run unchanged against SQLite in
//! production and against an in-memory store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{StreakRecord, StreakUpdate};
use shared::{DailyTask, TaskStatus};

mod sqlite;
#[cfg(test)]
pub mod memory;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Record was modified concurrently")]
    ConcurrentModification,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which streaks a bulk operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakScope {
    /// Every group streak of one user
    User(Uuid),
    /// Every member's streak in one group
    Group(Uuid),
}

/// Which tasks the pending deriver looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// One user's tasks in one group
    UserInGroup { user_id: Uuid, group_id: Uuid },
    /// One user's tasks across all of their groups
    User(Uuid),
}

#[async_trait]
pub trait StreakStore: Send + Sync {
    async fn find_streak(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<StreakRecord>, StoreError>;

    /// Create a zeroed streak. Returns the existing one if another writer got there first.
    async fn create_streak(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError>;

    /// Write `update` only if the stored version still equals `expected_version`.
    ///
    /// Fails with `ConcurrentModification` when the version moved and `NotFound` when the
    /// streak no longer exists.
    async fn update_streak(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &StreakUpdate,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StoreError>;

    async fn list_streaks(&self, scope: StreakScope) -> Result<Vec<StreakRecord>, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Tasks in `scope` with `status` whose date is strictly before `due_before`,
    /// oldest first
    async fn find_tasks_by_status(
        &self,
        scope: TaskScope,
        status: TaskStatus,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<DailyTask>, StoreError>;

    /// Move a task from status `from` to `to`. `completed_at` is stored as given, so
    /// callers clear it by passing `None`.
    ///
    /// Writes nothing and returns `None` when the task is gone or its stored status is no
    /// longer `from`, so at most one of several racing writers wins a transition.
    async fn update_task_status(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DailyTask>, StoreError>;
}
