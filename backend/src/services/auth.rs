use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserRow;
use crate::services::calendar::{Calendar, CalendarError};
use shared::{LoginRequest, SignupRequest, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidTimezone(#[from] CalendarError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Password hashing error")]
    HashingError,
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// IANA timezone of the user at login, used for all calendar-day math of the session
    pub tz: String,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated caller of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub calendar: Calendar,
}

pub async fn signup(pool: &SqlitePool, request: &SignupRequest) -> Result<User, AuthError> {
    // Reject unknown timezones before anything is stored
    Calendar::new(&request.timezone)?;

    let email = request.email.trim().to_lowercase();
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Err(AuthError::UserAlreadyExists);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(request.password.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingError)?
        .to_string();

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, timezone, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(request.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(&request.timezone)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    log::info!("New user signed up: {}", id);

    Ok(User {
        id,
        name: request.name.trim().to_string(),
        email,
        timezone: request.timezone.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn login(pool: &SqlitePool, request: &LoginRequest) -> Result<User, AuthError> {
    let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(request.email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(request.password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)?;

    Ok(user.to_shared()?)
}

pub async fn get_user_by_id(pool: &SqlitePool, user_id: &Uuid) -> Result<Option<User>, AuthError> {
    let user: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(user.map(|u| u.to_shared()).transpose()?)
}

pub fn create_jwt(user: &User, secret: &str, expiration_hours: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub: user.id.to_string(),
        tz: user.timezone.clone(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Session, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    let user_id =
        Uuid::parse_str(&token_data.claims.sub).map_err(|_| AuthError::InvalidCredentials)?;
    let calendar = Calendar::new(&token_data.claims.tz)?;

    Ok(Session { user_id, calendar })
}
