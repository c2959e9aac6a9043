use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::Utc;
use shared::{ApiError, ApiSuccess, CreateTaskRequest, UpdateTaskRequest};
use uuid::Uuid;

use super::{forbidden, internal_error, invalid_id, not_found, require_member, unauthorized, validation_error};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::streaks::StreakError;
use crate::services::tasks::{self as task_service, TaskError, TaskFilter};

/// Routes nested under `/groups/{group_id}`
pub fn configure_group(cfg: &mut web::ServiceConfig) {
    cfg.route("/tasks", web::get().to(list_group_tasks))
        .route("/tasks", web::post().to(create_task));
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tasks")
            .route("/{task_id}", web::patch().to(update_task))
            .route("/{task_id}", web::delete().to(delete_task)),
    );
}

fn task_error(e: TaskError) -> HttpResponse {
    match e {
        TaskError::NotFound => not_found("Task not found"),
        TaskError::NotOwner => forbidden("You can only change your own tasks"),
        TaskError::AlreadyExists => HttpResponse::Conflict().json(ApiError::new(
            "task_exists",
            "You have already posted a task for this date in this group",
        )),
        TaskError::DayPassed => HttpResponse::BadRequest().json(ApiError::new(
            "day_passed",
            "The task's day has already passed",
        )),
        TaskError::StatusConflict => HttpResponse::Conflict().json(ApiError::new(
            "conflict",
            "The task was updated at the same time, please retry",
        )),
        TaskError::StreakError(StreakError::ConcurrentModification) => HttpResponse::Conflict().json(
            ApiError::new("conflict", "Your streak was updated at the same time, please retry"),
        ),
        e => {
            log::error!("Task error: {:?}", e);
            internal_error("Failed to process task")
        }
    }
}

async fn list_group_tasks(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<TaskFilter>,
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

    match task_service::list_group_tasks(&state.db, &group_id, &query, &session).await {
        Ok(tasks) => Ok(HttpResponse::Ok().json(ApiSuccess::new(tasks))),
        Err(e) => Ok(task_error(e)),
    }
}

async fn create_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<CreateTaskRequest>,
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

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match task_service::create_task(&state.db, &group_id, &session, &request, Utc::now()).await {
        Ok(task) => Ok(HttpResponse::Created().json(ApiSuccess::new(task))),
        Err(e) => Ok(task_error(e)),
    }
}

async fn update_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateTaskRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let task_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("task")),
    };

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match task_service::update_task(&state.db, &state.store, &task_id, &session, &request, Utc::now()).await {
        Ok(task) => Ok(HttpResponse::Ok().json(ApiSuccess::new(task))),
        Err(e) => Ok(task_error(e)),
    }
}

async fn delete_task(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let task_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("task")),
    };

    match task_service::delete_task(&state.db, &task_id, &session, Utc::now()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(task_error(e)),
    }
}
