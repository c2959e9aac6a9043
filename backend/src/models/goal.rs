use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_enum, parse_id, user_summary};

/// Database model for goals. Checklist items and milestones are stored as JSON arrays.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GoalWithUserRow {
    // Goal fields
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub goal_type: String,
    pub items: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub milestones: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // User fields
    pub user_name: String,
    pub user_email: String,
}

impl GoalWithUserRow {
    pub fn to_goal(&self) -> Result<shared::Goal, sqlx::Error> {
        Ok(shared::Goal {
            id: parse_id(&self.id)?,
            group_id: parse_id(&self.group_id)?,
            user_id: parse_id(&self.user_id)?,
            title: self.title.clone(),
            description: self.description.clone(),
            goal_type: parse_enum(&self.goal_type, "goal type")?,
            items: decode_json_list(self.items.as_deref())?,
            start_date: self.start_date,
            end_date: self.end_date,
            milestones: decode_json_list(self.milestones.as_deref())?,
            status: parse_enum(&self.status, "goal status")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn to_shared(&self) -> Result<shared::GoalWithUser, sqlx::Error> {
        let goal = self.to_goal()?;
        let progress = goal.progress();
        Ok(shared::GoalWithUser {
            goal,
            user: user_summary(&self.user_id, &self.user_name, &self.user_email)?,
            progress,
        })
    }
}

fn decode_json_list<T: serde::de::DeserializeOwned>(value: Option<&str>) -> Result<Vec<T>, sqlx::Error> {
    match value {
        Some(json) => serde_json::from_str(json).map_err(|e| sqlx::Error::Decode(Box::new(e))),
        None => Ok(Vec::new()),
    }
}

/// Encode a checklist or milestone list for storage
pub fn encode_json_list<T: Serialize>(values: &[T]) -> Result<String, sqlx::Error> {
    serde_json::to_string(values).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}
