use std::str::FromStr;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db::SqliteStore;

pub mod daily_task;
pub mod goal;
pub mod group;
pub mod join_request;
pub mod membership;
pub mod streak;
pub mod user;

pub use daily_task::*;
pub use goal::*;
pub use group::*;
pub use join_request::*;
pub use membership::*;
pub use streak::*;
pub use user::*;

/// Application state shared across all handlers
pub struct AppState {
    pub db: SqlitePool,
    pub store: SqliteStore,
    pub config: Config,
}

/// Decode a TEXT id column into a Uuid
pub fn parse_id(value: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Decode a TEXT enum column. Unknown values are a decode error.
pub fn parse_enum<T: FromStr>(value: &str, column: &str) -> Result<T, sqlx::Error> {
    value
        .parse()
        .map_err(|_| sqlx::Error::Decode(format!("unknown {} {:?}", column, value).into()))
}
