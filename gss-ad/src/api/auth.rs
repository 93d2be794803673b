//! Session login for the dashboard
//!
//! A successful login issues a random token in the `admin_session` cookie.
//! Tokens live in memory and expire after eight hours; a restart logs
//! everyone out.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "admin_session";

/// Session lifetime in hours
pub const SESSION_TTL_HOURS: i64 = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /admin/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;

    let credentials = state.credentials.as_ref().ok_or_else(|| {
        ApiError::Internal("Admin credentials not configured".to_string())
    })?;

    if request.username != credentials.username || request.password != credentials.password {
        warn!(username = %request.username, "Rejected dashboard login");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = Uuid::new_v4().to_string();
    let expires = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
    {
        let mut sessions = state.sessions.write().await;
        // Drop expired tokens so the map does not grow without bound
        let now = Utc::now();
        sessions.retain(|_, expiry| *expiry > now);
        sessions.insert(token.clone(), expires);
    }
    info!(username = %request.username, "Dashboard login");

    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        SESSION_COOKIE,
        token,
        SESSION_TTL_HOURS * 3600
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("Invalid session cookie: {}", e)))?;

    let mut response = Json(json!({ "success": true })).into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Rejects requests without a live session cookie
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))?;

    let live = {
        let sessions = state.sessions.read().await;
        sessions
            .get(token.as_str())
            .is_some_and(|expiry| *expiry > Utc::now())
    };
    if !live {
        return Err(ApiError::Unauthorized("Session expired".to_string()));
    }

    Ok(next.run(request).await)
}

/// Value of the session cookie, if the request carries one
fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_found_among_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; admin_session=abc-123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_session_token_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("admin_session="));
        assert_eq!(session_token(&headers), None);
    }
}
