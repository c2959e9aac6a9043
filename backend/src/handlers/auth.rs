use actix_web::{web, HttpRequest, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, AuthResponse, LoginRequest, SignupRequest, User};

use super::{internal_error, not_found, unauthorized, validation_error};
use crate::middleware::auth::extract_session;
use crate::models::AppState;
use crate::services::auth::{self as auth_service, AuthError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(get_current_user)),
    );
}

fn token_response(state: &AppState, user: User, created: bool) -> HttpResponse {
    match auth_service::create_jwt(&user, &state.config.jwt_secret, state.config.jwt_expiration_hours) {
        Ok(token) => {
            let body = ApiSuccess::new(AuthResponse { token, user });
            if created {
                HttpResponse::Created().json(body)
            } else {
                HttpResponse::Ok().json(body)
            }
        }
        Err(e) => {
            log::error!("JWT creation error: {:?}", e);
            internal_error("Failed to create token")
        }
    }
}

async fn signup(state: web::Data<AppState>, body: web::Json<SignupRequest>) -> Result<HttpResponse> {
    let request = body.into_inner();

    if let Err(e) = request.validate() {
        return Ok(validation_error(e));
    }

    match auth_service::signup(&state.db, &request).await {
        Ok(user) => Ok(token_response(&state, user, true)),
        Err(AuthError::UserAlreadyExists) => Ok(HttpResponse::Conflict().json(ApiError::new(
            "user_exists",
            "An account with this email already exists",
        ))),
        Err(AuthError::InvalidTimezone(e)) => {
            Ok(HttpResponse::BadRequest().json(ApiError::new("invalid_timezone", e.to_string())))
        }
        Err(e) => {
            log::error!("Signup error: {:?}", e);
            Ok(internal_error("Failed to create account"))
        }
    }
}

async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> Result<HttpResponse> {
    let request = body.into_inner();

    match auth_service::login(&state.db, &request).await {
        Ok(user) => Ok(token_response(&state, user, false)),
        Err(AuthError::InvalidCredentials) => Ok(HttpResponse::Unauthorized().json(ApiError::new(
            "authentication_error",
            "Invalid email or password",
        ))),
        Err(e) => {
            log::error!("Login error: {:?}", e);
            Ok(internal_error("Failed to log in"))
        }
    }
}

async fn get_current_user(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let session = match extract_session(&req, &state.config.jwt_secret) {
        Ok(s) => s,
        Err(_) => return Ok(unauthorized()),
    };

    match auth_service::get_user_by_id(&state.db, &session.user_id).await {
        Ok(Some(user)) => Ok(HttpResponse::Ok().json(ApiSuccess::new(user))),
        Ok(None) => Ok(not_found("User not found")),
        Err(e) => {
            log::error!("Error fetching user: {:?}", e);
            Ok(internal_error("Failed to fetch user"))
        }
    }
}
