//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use edu_platform_core::domain::UserRole;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{middleware::session_token_from_headers, state::AppState};

/// How long a login session stays valid.
const SESSION_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    /// "admin" or "student"; defaults to "student" when omitted.
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    /// The login token. Browsers get it as a cookie as well; API clients send
    /// it back as `Authorization: Bearer <token>`.
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

fn session_cookie(token: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        token,
        Duration::days(SESSION_LIFETIME_DAYS).num_seconds()
    )
}

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Resolve the requested role (students by default)
    let role = match req.role.as_deref() {
        None => UserRole::Student,
        Some(raw) => UserRole::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("'{}' is not a valid role", raw),
            )
        })?,
    };

    // 2. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?
        .to_string();

    // 3. Create user in database
    let user = state
        .db
        .create_user(&req.email, &password_hash, &req.name, role)
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create user".to_string(),
            )
        })?;

    // 4. Generate auth session token and expiration
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);

    // 5. Create auth session in database
    state
        .db
        .create_auth_session(&token, user.user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    // 6. Return response with session cookie
    let cookie = session_cookie(&token);
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email,
        name: user.name,
        role: user.role.as_str().to_string(),
        token,
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Get user by email
    let user_creds = state.db.get_user_by_email(&req.email).await.map_err(|e| {
        error!("Failed to get user: {:?}", e);
        (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
    })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        ));
    }

    // 3. Generate auth session token and expiration
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);

    // 4. Create auth session in database
    state
        .db
        .create_auth_session(&token, user_creds.user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    // 5. Return response with session cookie
    let cookie = session_cookie(&token);
    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
        name: user_creds.name,
        role: user_creds.role.as_str().to_string(),
        token,
    };

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// GET /auth/me - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    axum::Extension(user): axum::Extension<crate::web::middleware::AuthedUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state.db.get_user_profile(user.user_id).await.map_err(|e| {
        error!("Failed to load profile for {}: {:?}", user.user_id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load profile".to_string(),
        )
    })?;

    Ok(Json(ProfileResponse {
        user_id: profile.user_id,
        email: profile.email,
        name: profile.name,
        role: profile.role.as_str().to_string(),
    }))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Extract the login token
    let token = session_token_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?
        .to_owned();

    // 2. Delete auth session from database
    state.db.delete_auth_session(&token).await.map_err(|e| {
        error!("Failed to delete auth session: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to logout".to_string(),
        )
    })?;

    // 3. Clear cookie
    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}
