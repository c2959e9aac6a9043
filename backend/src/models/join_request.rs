use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_enum, parse_id, user_summary};

/// Database model for join requests with the requester's info (for JOIN queries)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JoinRequestWithUserRow {
    // Join request fields
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // User fields
    pub user_name: String,
    pub user_email: String,
}

impl JoinRequestWithUserRow {
    pub fn to_shared(&self) -> Result<shared::JoinRequestWithUser, sqlx::Error> {
        Ok(shared::JoinRequestWithUser {
            request: shared::JoinRequest {
                id: parse_id(&self.id)?,
                group_id: parse_id(&self.group_id)?,
                user_id: parse_id(&self.user_id)?,
                message: self.message.clone(),
                status: parse_enum(&self.status, "join request status")?,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            user: user_summary(&self.user_id, &self.user_name, &self.user_email)?,
        })
    }
}
