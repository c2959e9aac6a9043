pub mod auth;
pub mod calendar;
pub mod goals;
pub mod groups;
pub mod join_requests;
pub mod pending_tasks;
pub mod streaks;
pub mod tasks;
