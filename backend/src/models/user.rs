use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::parse_id;

/// Database model for users
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn to_shared(&self) -> Result<shared::User, sqlx::Error> {
        Ok(shared::User {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            email: self.email.clone(),
            timezone: self.timezone.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Build a user summary from the `user_id`, `user_name` and `user_email` columns of a JOIN
pub fn user_summary(id: &str, name: &str, email: &str) -> Result<shared::UserSummary, sqlx::Error> {
    Ok(shared::UserSummary {
        id: parse_id(id)?,
        name: name.to_string(),
        email: email.to_string(),
    })
}
