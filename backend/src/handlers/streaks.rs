use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::Utc;
use shared::{ApiSuccess, StreakWithUser};
use uuid::Uuid;

use super::{internal_error, invalid_id, require_member, unauthorized};
use crate::db::{StreakScope, TaskScope};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::groups as group_service;
use crate::services::pending_tasks;
use crate::services::streaks as streak_service;

/// Routes nested under `/groups/{group_id}`
pub fn configure_group(cfg: &mut web::ServiceConfig) {
    cfg.route("/streaks", web::get().to(list_group_streaks))
        .route("/streaks/me", web::get().to(get_my_streak))
        .route("/pending", web::get().to(list_my_pending_tasks));
}

/// Streak board of a group. Stale streaks are reset before listing so the board never
/// shows a streak that was already broken by a skipped day.
async fn list_group_streaks(
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

    let scope = StreakScope::Group(group_id);
    if let Err(e) = streak_service::sweep_stale_streaks(&state.store, scope, Utc::now()).await {
        // A failed sweep only leaves stale numbers on the board
        log::warn!("Streak sweep for group {} failed: {:?}", group_id, e);
    }

    let streaks = match streak_service::list_streaks(&state.store, scope).await {
        Ok(streaks) => streaks,
        Err(e) => {
            log::error!("Error listing streaks: {:?}", e);
            return Ok(internal_error("Failed to list streaks"));
        }
    };

    let members = match group_service::list_members(&state.db, &group_id).await {
        Ok(members) => members,
        Err(e) => {
            log::error!("Error listing members: {:?}", e);
            return Ok(internal_error("Failed to list streaks"));
        }
    };

    let users: HashMap<Uuid, _> = members.into_iter().map(|m| (m.user.id, m.user)).collect();
    let board: Vec<StreakWithUser> = streaks
        .into_iter()
        .filter_map(|streak| {
            users
                .get(&streak.user_id)
                .cloned()
                .map(|user| StreakWithUser { streak, user })
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiSuccess::new(board)))
}

/// The caller's own streak in a group, swept first like the board
async fn get_my_streak(
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

    let scope = StreakScope::User(session.user_id);
    if let Err(e) = streak_service::sweep_stale_streaks(&state.store, scope, Utc::now()).await {
        log::warn!("Streak sweep for user {} failed: {:?}", session.user_id, e);
    }

    match streak_service::get_streak(&state.store, session.user_id, group_id).await {
        Ok(streak) => Ok(HttpResponse::Ok().json(ApiSuccess::new(streak))),
        Err(e) => {
            log::error!("Error fetching streak: {:?}", e);
            Ok(internal_error("Failed to fetch streak"))
        }
    }
}

async fn list_my_pending_tasks(
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

    let scope = TaskScope::UserInGroup {
        user_id: session.user_id,
        group_id,
    };
    match pending_tasks::pending_tasks_with_age(&state.store, scope, &session.calendar, Utc::now()).await {
        Ok(pending) => Ok(HttpResponse::Ok().json(ApiSuccess::new(pending))),
        Err(e) => {
            log::error!("Error listing pending tasks: {:?}", e);
            Ok(internal_error("Failed to list pending tasks"))
        }
    }
}
