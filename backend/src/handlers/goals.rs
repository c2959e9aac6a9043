use actix_web::{web, HttpRequest, HttpResponse, Result};
use shared::{ApiSuccess, CreateGoalRequest, UpdateGoalRequest};
use uuid::Uuid;

use super::{forbidden, internal_error, invalid_id, not_found, require_member, unauthorized, validation_error};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::goals::{self as goal_service, GoalError};

/// Routes nested under `/groups/{group_id}`
pub fn configure_group(cfg: &mut web::ServiceConfig) {
    cfg.route("/goals", web::get().to(list_group_goals))
        .route("/goals", web::post().to(create_goal));
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/goals")
            .route("/{goal_id}", web::get().to(get_goal))
            .route("/{goal_id}", web::patch().to(update_goal))
            .route("/{goal_id}", web::delete().to(delete_goal)),
    );
}

fn goal_error(e: GoalError) -> HttpResponse {
    match e {
        GoalError::NotFound => not_found("Goal not found"),
        GoalError::NotOwner => forbidden("You can only change your own goals"),
        e => {
            log::error!("Goal error: {:?}", e);
            internal_error("Failed to process goal")
        }
    }
}

async fn list_group_goals(
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

    match goal_service::list_group_goals(&state.db, &group_id).await {
        Ok(goals) => Ok(HttpResponse::Ok().json(ApiSuccess::new(goals))),
        Err(e) => Ok(goal_error(e)),
    }
}

async fn create_goal(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<CreateGoalRequest>,
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

    match goal_service::create_goal(&state.db, &group_id, &session.user_id, &request).await {
        Ok(goal) => Ok(HttpResponse::Created().json(ApiSuccess::new(goal))),
        Err(e) => Ok(goal_error(e)),
    }
}

async fn get_goal(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let goal_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("goal")),
    };

    let goal = match goal_service::get_goal(&state.db, &goal_id).await {
        Ok(Some(goal)) => goal,
        Ok(None) => return Ok(not_found("Goal not found")),
        Err(e) => return Ok(goal_error(e)),
    };

    if let Err(resp) = require_member(&state, &goal.goal.group_id, &session.user_id).await {
        return Ok(resp);
    }

    Ok(HttpResponse::Ok().json(ApiSuccess::new(goal)))
}

async fn update_goal(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateGoalRequest>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let goal_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("goal")),
    };

    let request = body.into_inner();
    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match goal_service::update_goal(&state.db, &goal_id, &session.user_id, &request).await {
        Ok(goal) => Ok(HttpResponse::Ok().json(ApiSuccess::new(goal))),
        Err(e) => Ok(goal_error(e)),
    }
}

async fn delete_goal(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    let goal_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => return Ok(invalid_id("goal")),
    };

    match goal_service::delete_goal(&state.db, &goal_id, &session.user_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(goal_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{signed_up, test_state};
    use crate::services::groups as group_service;
    use actix_web::{http::StatusCode, test, App};
    use shared::{ChecklistItem, GoalType, GoalWithUser};

    #[actix_web::test]
    async fn test_goal_visibility_and_ownership() {
        let state = test_state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(crate::handlers::configure_routes)).await;
        let (owner, auth) = signed_up(&state, "Lena", "UTC").await;
        let (_, outsider) = signed_up(&state, "Otto", "UTC").await;
        let group = group_service::tests::create_test_group(&state.db, &owner.id, "Savers").await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/groups/{}/goals", group.id))
            .insert_header(("Authorization", auth.clone()))
            .set_json(CreateGoalRequest {
                title: "Emergency fund".to_string(),
                description: None,
                goal_type: GoalType::ShortTerm,
                items: Some(vec![
                    ChecklistItem { id: "a".to_string(), text: "Open account".to_string(), completed: true },
                    ChecklistItem { id: "b".to_string(), text: "Save 1000".to_string(), completed: false },
                ]),
                start_date: None,
                end_date: None,
                milestones: None,
            })
            .to_request();
        let created: ApiSuccess<GoalWithUser> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created.data.progress, 0.5);
        let goal_uri = format!("/api/goals/{}", created.data.goal.id);

        let req = test::TestRequest::get().uri(&goal_uri).insert_header(("Authorization", outsider.clone())).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete().uri(&goal_uri).insert_header(("Authorization", outsider)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete().uri(&goal_uri).insert_header(("Authorization", auth.clone())).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri(&goal_uri).insert_header(("Authorization", auth)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
