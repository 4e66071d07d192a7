//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{Json, Response},
};
use edu_platform_core::domain::UserRole;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::web::state::AppState;

/// The error shape every endpoint returns, `{"error": "..."}`.
type AuthRejection = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, message: &str) -> AuthRejection {
    (status, Json(serde_json::json!({ "error": message })))
}

/// The authenticated caller, inserted into request extensions by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Extracts the login token from the request headers.
///
/// The `Authorization: Bearer <token>` header is authoritative; the `session=`
/// cookie set by the auth endpoints is accepted as a fallback for browsers.
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie_header| {
            cookie_header.split(';').find_map(|c| {
                let c = c.trim();
                c.strip_prefix("session=")
            })
        })
}

/// Middleware that validates the login token and extracts the caller identity.
///
/// If valid, inserts an `AuthedUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized before any handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    // 1. Extract the token from the Authorization header or session cookie
    let token = session_token_from_headers(req.headers())
        .map(str::to_owned)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    // 2. Validate the token in the database, get user_id and role
    let (user_id, role) = state
        .db
        .validate_auth_session(&token)
        .await
        .map_err(|e| {
            error!("Failed to validate auth session: {:?}", e);
            reject(StatusCode::UNAUTHORIZED, "Unauthorized")
        })?;

    // 3. Insert the caller identity into request extensions
    req.extensions_mut().insert(AuthedUser { user_id, role });

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// Middleware for the admin routes. Must be layered inside `require_auth`;
/// rejects callers whose account role is not `admin`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AuthRejection> {
    let user = req
        .extensions()
        .get::<AuthedUser>()
        .copied()
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    if user.role != UserRole::Admin {
        return Err(reject(StatusCode::FORBIDDEN, "Admin access required"));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok-from-header"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session=tok-from-cookie"),
        );
        assert_eq!(
            session_token_from_headers(&headers),
            Some("tok-from-header")
        );
    }

    #[test]
    fn session_cookie_is_parsed_from_multiple_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=ko"),
        );
        assert_eq!(session_token_from_headers(&headers), Some("abc123"));
    }

    #[test]
    fn missing_credential_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(session_token_from_headers(&headers), None);
    }
}
