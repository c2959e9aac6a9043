use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::Utc;
use shared::{ApiSuccess, Dashboard, DashboardGroup, GroupRef, PendingTaskWithGroup, StreakWithGroup};
use uuid::Uuid;

use super::{internal_error, unauthorized};
use crate::db::{StreakScope, TaskScope};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::groups as group_service;
use crate::services::pending_tasks;
use crate::services::streaks as streak_service;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(get_dashboard));
}

/// Name of a group the caller may no longer belong to. Pending tasks outlive membership.
async fn group_ref(state: &AppState, names: &mut HashMap<Uuid, String>, group_id: Uuid) -> Option<GroupRef> {
    if let Some(name) = names.get(&group_id) {
        return Some(GroupRef { id: group_id, name: name.clone() });
    }
    match group_service::get_group(&state.db, &group_id).await {
        Ok(Some(group)) => {
            names.insert(group.id, group.name.clone());
            Some(GroupRef { id: group.id, name: group.name })
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!("Could not resolve group {}: {:?}", group_id, e);
            None
        }
    }
}

/// Everything the home screen shows for the caller, computed in their timezone
async fn get_dashboard(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };
    let now = Utc::now();

    let memberships = match group_service::list_user_groups(&state.db, &session.user_id).await {
        Ok(groups) => groups,
        Err(e) => {
            log::error!("Error listing groups: {:?}", e);
            return Ok(internal_error("Failed to load dashboard"));
        }
    };

    let mut groups = Vec::with_capacity(memberships.len());
    for membership in memberships {
        let pending_count = match pending_tasks::pending_count(
            &state.store,
            session.user_id,
            membership.group.id,
            &session.calendar,
            now,
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                log::error!("Error counting pending tasks: {:?}", e);
                return Ok(internal_error("Failed to load dashboard"));
            }
        };
        groups.push(DashboardGroup {
            group: membership.group,
            role: membership.role,
            member_count: membership.member_count,
            pending_count,
        });
    }

    let scope = StreakScope::User(session.user_id);
    if let Err(e) = streak_service::sweep_stale_streaks(&state.store, scope, now).await {
        log::warn!("Streak sweep for user {} failed: {:?}", session.user_id, e);
    }

    let streaks = match streak_service::list_streaks(&state.store, scope).await {
        Ok(streaks) => streaks,
        Err(e) => {
            log::error!("Error listing streaks: {:?}", e);
            return Ok(internal_error("Failed to load dashboard"));
        }
    };

    let pending = match pending_tasks::pending_tasks_with_age(
        &state.store,
        TaskScope::User(session.user_id),
        &session.calendar,
        now,
    )
    .await
    {
        Ok(pending) => pending,
        Err(e) => {
            log::error!("Error listing pending tasks: {:?}", e);
            return Ok(internal_error("Failed to load dashboard"));
        }
    };

    let mut names: HashMap<Uuid, String> = groups.iter().map(|g| (g.group.id, g.group.name.clone())).collect();

    // Streaks are only shown for groups the caller still belongs to
    let streaks: Vec<StreakWithGroup> = streaks
        .into_iter()
        .filter_map(|streak| {
            names.get(&streak.group_id).map(|name| StreakWithGroup {
                group: GroupRef { id: streak.group_id, name: name.clone() },
                streak,
            })
        })
        .collect();
    let best_streak = streaks.iter().map(|s| s.streak.best_streak).max().unwrap_or(0);

    let mut pending_tasks = Vec::with_capacity(pending.len());
    for task in pending {
        if let Some(group) = group_ref(&state, &mut names, task.task.group_id).await {
            pending_tasks.push(PendingTaskWithGroup { pending: task, group });
        }
    }

    Ok(HttpResponse::Ok().json(ApiSuccess::new(Dashboard {
        groups,
        streaks,
        pending_tasks,
        best_streak,
    })))
}
