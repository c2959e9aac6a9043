use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use shared::{
    ApiError, ApiSuccess, CreateGroupRequest, CreateJoinRequestRequest, HandleJoinRequestRequest,
    InviteLink, UpdateGroupRequest,
};
use uuid::Uuid;

use super::{
    forbidden, internal_error, invalid_id, not_found, require_admin, require_member, unauthorized,
    validation_error,
};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::groups::{self as group_service, GroupError};
use crate::services::join_requests::{self as join_request_service, JoinRequestError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/groups")
            .route("", web::get().to(list_groups))
            .route("", web::post().to(create_group))
            .route("/public", web::get().to(browse_public_groups))
            .route("/{group_id}", web::get().to(get_group))
            .route("/{group_id}", web::patch().to(update_group))
            .route("/{group_id}", web::delete().to(delete_group))
            .route("/{group_id}/members", web::get().to(list_members))
            .route("/{group_id}/members/{user_id}", web::delete().to(remove_member))
            .route("/{group_id}/invite", web::post().to(create_invite))
            .route("/{group_id}/invite", web::delete().to(revoke_invite))
            .route("/{group_id}/join-requests", web::get().to(list_join_requests))
            .route("/{group_id}/join-requests", web::post().to(create_join_request))
            .route("/{group_id}/join-requests", web::patch().to(handle_join_request))
            .service(
                web::scope("/{group_id}")
                    .configure(super::tasks::configure_group)
                    .configure(super::streaks::configure_group)
                    .configure(super::goals::configure_group),
            ),
    );
}

#[derive(Debug, Deserialize)]
struct BrowseQuery {
    search: Option<String>,
}

async fn list_groups(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    match group_service::list_user_groups(&state.db, &session.user_id).await {
        Ok(groups) => Ok(HttpResponse::Ok().json(ApiSuccess::new(groups))),
        Err(e) => {
            log::error!("Error listing groups: {:?}", e);
            Ok(internal_error("Failed to list groups"))
        }
    }
}

async fn create_group(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match group_service::create_group(&state.db, &session.user_id, &request).await {
        Ok(group) => Ok(HttpResponse::Created().json(ApiSuccess::new(group))),
        Err(e) => {
            log::error!("Error creating group: {:?}", e);
            Ok(internal_error("Failed to create group"))
        }
    }
}

async fn browse_public_groups(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<BrowseQuery>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    match group_service::browse_public_groups(&state.db, &session.user_id, query.search.as_deref()).await {
        Ok(groups) => Ok(HttpResponse::Ok().json(ApiSuccess::new(groups))),
        Err(e) => {
            log::error!("Error browsing groups: {:?}", e);
            Ok(internal_error("Failed to browse groups"))
        }
    }
}

async fn get_group(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    let role = match require_member(&state, &group_id, &session.user_id).await {
        Ok(role) => role,
        Err(resp) => return Ok(resp),
    };

    match group_service::get_group_details(&state.db, &group_id, role).await {
        Ok(details) => Ok(HttpResponse::Ok().json(ApiSuccess::new(details))),
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error fetching group: {:?}", e);
            Ok(internal_error("Failed to fetch group"))
        }
    }
}

async fn update_group(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateGroupRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match group_service::update_group(&state.db, &group_id, &request).await {
        Ok(group) => Ok(HttpResponse::Ok().json(ApiSuccess::new(group))),
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error updating group: {:?}", e);
            Ok(internal_error("Failed to update group"))
        }
    }
}

async fn delete_group(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    // Other admins cannot delete the group
    match group_service::get_group(&state.db, &group_id).await {
        Ok(Some(group)) if group.owner_id == session.user_id => {}
        Ok(Some(_)) => return Ok(forbidden("Only the group owner can delete the group")),
        Ok(None) => return Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error fetching group: {:?}", e);
            return Ok(internal_error("Failed to delete group"));
        }
    }

    match group_service::delete_group(&state.db, &group_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error deleting group: {:?}", e);
            Ok(internal_error("Failed to delete group"))
        }
    }
}

async fn list_members(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_member(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    match group_service::list_members(&state.db, &group_id).await {
        Ok(members) => Ok(HttpResponse::Ok().json(ApiSuccess::new(members))),
        Err(e) => {
            log::error!("Error listing members: {:?}", e);
            Ok(internal_error("Failed to list members"))
        }
    }
}

async fn remove_member(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let (group_id, user_id) = path.into_inner();
    let group_id = match Uuid::parse_str(&group_id) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };
    let user_id = match Uuid::parse_str(&user_id) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("user")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    match group_service::remove_member(&state.db, &group_id, &user_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(GroupError::CannotRemoveOwner) => Ok(HttpResponse::BadRequest().json(ApiError::new(
            "cannot_remove_owner",
            "The group owner cannot be removed",
        ))),
        Err(GroupError::MemberNotFound) => Ok(not_found("Member not found")),
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error removing member: {:?}", e);
            Ok(internal_error("Failed to remove member"))
        }
    }
}

async fn create_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    match group_service::regenerate_invite_token(&state.db, &group_id).await {
        Ok(invite_token) => {
            let invite_url = state.config.invite_url(&invite_token);
            Ok(HttpResponse::Ok().json(ApiSuccess::new(InviteLink { invite_token, invite_url })))
        }
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error creating invite link: {:?}", e);
            Ok(internal_error("Failed to create invite link"))
        }
    }
}

/// Revoking rotates the token, so every previously shared link stops working
async fn revoke_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    match group_service::regenerate_invite_token(&state.db, &group_id).await {
        Ok(_) => Ok(HttpResponse::NoContent().finish()),
        Err(GroupError::NotFound) => Ok(not_found("Group not found")),
        Err(e) => {
            log::error!("Error revoking invite link: {:?}", e);
            Ok(internal_error("Failed to revoke invite link"))
        }
    }
}

fn join_request_error(e: JoinRequestError) -> HttpResponse {
    match e {
        JoinRequestError::GroupNotFound => not_found("Group not found"),
        JoinRequestError::NotFound => not_found("Join request not found"),
        JoinRequestError::AlreadyMember => HttpResponse::Conflict().json(ApiError::new(
            "already_member",
            "You are already a member of this group",
        )),
        JoinRequestError::AlreadyRequested => HttpResponse::Conflict().json(ApiError::new(
            "already_requested",
            "You have already requested to join this group",
        )),
        JoinRequestError::AlreadyHandled => HttpResponse::Conflict().json(ApiError::new(
            "already_handled",
            "This join request was already handled",
        )),
        e => {
            log::error!("Join request error: {:?}", e);
            internal_error("Failed to process join request")
        }
    }
}

async fn list_join_requests(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    match join_request_service::list_pending_requests(&state.db, &group_id).await {
        Ok(requests) => Ok(HttpResponse::Ok().json(ApiSuccess::new(requests))),
        Err(e) => Ok(join_request_error(e)),
    }
}

async fn create_join_request(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<CreateJoinRequestRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match join_request_service::create_join_request(
        &state.db,
        &group_id,
        &session.user_id,
        request.message.as_deref(),
    )
    .await
    {
        Ok(join_request) => Ok(HttpResponse::Created().json(ApiSuccess::new(join_request))),
        Err(e) => Ok(join_request_error(e)),
    }
}

async fn handle_join_request(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<HandleJoinRequestRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let group_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("group")),
    };

    if let Err(resp) = require_admin(&state, &group_id, &session.user_id).await {
        return Ok(resp);
    }

    let request = body.into_inner();
    match join_request_service::handle_join_request(&state.db, &group_id, &request.request_id, request.action)
        .await
    {
        Ok(status) => {
            log::info!("Join request {} in group {} {}", request.request_id, group_id, status.as_str());
            Ok(HttpResponse::Ok().json(ApiSuccess::new(status)))
        }
        Err(e) => Ok(join_request_error(e)),
    }
}
