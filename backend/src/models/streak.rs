use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::parse_id;

/// Database model for streaks, joined with the owner's timezone
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreakRow {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub current_streak: i64,
    pub best_streak: i64,
    pub last_task_date: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timezone: String,
}

impl StreakRow {
    pub fn to_record(&self) -> Result<StreakRecord, sqlx::Error> {
        Ok(StreakRecord {
            id: parse_id(&self.id)?,
            group_id: parse_id(&self.group_id)?,
            user_id: parse_id(&self.user_id)?,
            current_streak: decode_count(self.current_streak)?,
            best_streak: decode_count(self.best_streak)?,
            last_task_date: self.last_task_date,
            version: self.version,
            updated_at: self.updated_at,
            timezone: self.timezone.clone(),
        })
    }
}

fn decode_count(value: i64) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// A streak as the engine sees it: the public counters plus the row version used for
/// optimistic concurrency and the owner's timezone, which defines the streak's days.
#[derive(Debug, Clone, PartialEq)]
pub struct StreakRecord {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_task_date: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub timezone: String,
}

impl StreakRecord {
    pub fn to_shared(&self) -> shared::Streak {
        shared::Streak {
            id: self.id,
            group_id: self.group_id,
            user_id: self.user_id,
            current_streak: self.current_streak,
            best_streak: self.best_streak,
            last_task_date: self.last_task_date,
            updated_at: self.updated_at,
        }
    }
}

/// New counter values written by a conditional update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_task_date: Option<DateTime<Utc>>,
}
