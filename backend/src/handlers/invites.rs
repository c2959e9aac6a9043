use actix_web::{web, HttpRequest, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, JoinGroupResponse};

use super::{internal_error, not_found, unauthorized};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::groups::{self as group_service, GroupError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/invite")
            .route("/{token}", web::get().to(preview_invite))
            .route("/{token}", web::post().to(accept_invite)),
    );
}

async fn preview_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    if extract_session(&req, &state.config.jwt_secret).is_err() {
        return Ok(unauthorized());
    }

    match group_service::preview_invite(&state.db, &path.into_inner()).await {
        Ok(preview) => Ok(HttpResponse::Ok().json(ApiSuccess::new(preview))),
        Err(GroupError::InvalidInvite) => Ok(not_found("Invalid or expired invite link")),
        Err(e) => {
            log::error!("Error previewing invite: {:?}", e);
            Ok(internal_error("Failed to load invite"))
        }
    }
}

async fn accept_invite(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    match group_service::join_via_invite(&state.db, &path.into_inner(), &session.user_id).await {
        Ok(group_id) => Ok(HttpResponse::Ok().json(ApiSuccess::new(JoinGroupResponse { group_id }))),
        Err(GroupError::InvalidInvite) => Ok(not_found("Invalid or expired invite link")),
        Err(GroupError::AlreadyMember(group_id)) => Ok(HttpResponse::Conflict().json(ApiError::new(
            "already_member",
            group_id.to_string(),
        ))),
        Err(e) => {
            log::error!("Error joining via invite: {:?}", e);
            Ok(internal_error("Failed to join group"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{signed_up, test_state};
    use actix_web::{http::StatusCode, test, App};
    use shared::InvitePreview;

    #[actix_web::test]
    async fn test_invite_preview_and_join() {
        let state = test_state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(crate::handlers::configure_routes)).await;
        let (owner, _) = signed_up(&state, "Hana", "UTC").await;
        let (_, guest) = signed_up(&state, "Gus", "UTC").await;
        let group = group_service::tests::create_test_group(&state.db, &owner.id, "Walkers").await;
        let token = group_service::regenerate_invite_token(&state.db, &group.id).await.unwrap();
        let uri = format!("/api/invite/{}", token);

        let req = test::TestRequest::get().uri(&uri).insert_header(("Authorization", guest.clone())).to_request();
        let preview: ApiSuccess<InvitePreview> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(preview.data.group.id, group.id);
        assert_eq!(preview.data.member_count, 1);

        let req = test::TestRequest::post().uri(&uri).insert_header(("Authorization", guest.clone())).to_request();
        let joined: ApiSuccess<JoinGroupResponse> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(joined.data.group_id, group.id);

        let req = test::TestRequest::post().uri(&uri).insert_header(("Authorization", guest.clone())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.message, group.id.to_string());

        let req = test::TestRequest::get()
            .uri("/api/invite/not-a-token")
            .insert_header(("Authorization", guest))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
