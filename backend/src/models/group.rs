use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{parse_id, user_summary};

/// Database model for accountability groups
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub invite_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRow {
    pub fn to_shared(&self) -> Result<shared::Group, sqlx::Error> {
        Ok(shared::Group {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            description: self.description.clone(),
            owner_id: parse_id(&self.owner_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database model for group listings (JOIN with owner, member count and the caller's view)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupListingRow {
    // Group fields
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub invite_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Owner fields
    pub owner_name: String,
    pub owner_email: String,
    // Aggregates
    pub member_count: i64,
    pub member_role: Option<String>,
    pub has_pending_request: bool,
}

impl GroupListingRow {
    pub fn group(&self) -> Result<shared::Group, sqlx::Error> {
        Ok(shared::Group {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            description: self.description.clone(),
            owner_id: parse_id(&self.owner_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn owner(&self) -> Result<shared::UserSummary, sqlx::Error> {
        user_summary(&self.owner_id, &self.owner_name, &self.owner_email)
    }

    pub fn role(&self) -> shared::GroupRole {
        self.member_role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(shared::GroupRole::Member)
    }

    pub fn to_with_role(&self) -> Result<shared::GroupWithRole, sqlx::Error> {
        Ok(shared::GroupWithRole {
            group: self.group()?,
            owner: self.owner()?,
            role: self.role(),
            member_count: self.member_count,
        })
    }

    pub fn to_public(&self) -> Result<shared::PublicGroup, sqlx::Error> {
        Ok(shared::PublicGroup {
            group: self.group()?,
            owner: self.owner()?,
            member_count: self.member_count,
            has_pending_request: self.has_pending_request,
        })
    }

    pub fn to_preview(&self) -> Result<shared::InvitePreview, sqlx::Error> {
        Ok(shared::InvitePreview {
            group: self.group()?,
            owner: self.owner()?,
            member_count: self.member_count,
        })
    }
}
