use actix_web::{web, HttpResponse};
use shared::{ApiError, GroupRole};
use uuid::Uuid;

use crate::models::AppState;
use crate::services::groups as group_service;

pub mod auth;
pub mod dashboard;
pub mod goals;
pub mod groups;
pub mod invites;
pub mod streaks;
pub mod tasks;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(dashboard::configure)
            .configure(groups::configure)
            .configure(tasks::configure)
            .configure(goals::configure)
            .configure(invites::configure),
    );
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ApiError::new("unauthorized", "Invalid or missing token"))
}

fn invalid_id(what: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiError::new("invalid_id", format!("Invalid {} ID", what)))
}

fn forbidden(message: &str) -> HttpResponse {
    HttpResponse::Forbidden().json(ApiError::new("forbidden", message))
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ApiError::new("not_found", message))
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ApiError::new("internal_error", message))
}

fn validation_error(e: shared::ValidationError) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiError::new("validation_error", e.to_string()))
}

/// Role of `user_id` in the group, or the response to send when they are not a member
async fn require_member(
    state: &AppState,
    group_id: &Uuid,
    user_id: &Uuid,
) -> Result<GroupRole, HttpResponse> {
    match group_service::get_member_role(&state.db, group_id, user_id).await {
        Ok(Some(role)) => Ok(role),
        Ok(None) => Err(forbidden("You are not a member of this group")),
        Err(e) => {
            log::error!("Error checking membership: {:?}", e);
            Err(internal_error("Failed to check membership"))
        }
    }
}

async fn require_admin(state: &AppState, group_id: &Uuid, user_id: &Uuid) -> Result<(), HttpResponse> {
    if !require_member(state, group_id, user_id).await?.can_moderate() {
        return Err(forbidden("Only group admins can do this"));
    }
    Ok(())
}
