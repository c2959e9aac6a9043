use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_enum, parse_id, user_summary};

/// Database model for group memberships
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MembershipRow {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl MembershipRow {
    pub fn to_shared(&self) -> Result<shared::GroupMember, sqlx::Error> {
        Ok(shared::GroupMember {
            id: parse_id(&self.id)?,
            group_id: parse_id(&self.group_id)?,
            user_id: parse_id(&self.user_id)?,
            role: parse_enum(&self.role, "role")?,
            joined_at: self.joined_at,
        })
    }
}

/// Database model for memberships with user info (for JOIN queries)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MemberWithUserRow {
    // Membership fields
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    // User fields
    pub user_name: String,
    pub user_email: String,
}

impl MemberWithUserRow {
    pub fn to_shared(&self) -> Result<shared::MemberWithUser, sqlx::Error> {
        Ok(shared::MemberWithUser {
            membership: shared::GroupMember {
                id: parse_id(&self.id)?,
                group_id: parse_id(&self.group_id)?,
                user_id: parse_id(&self.user_id)?,
                role: parse_enum(&self.role, "role")?,
                joined_at: self.joined_at,
            },
            user: user_summary(&self.user_id, &self.user_name, &self.user_email)?,
        })
    }
}
