//! gss-ad library - admin dashboard
//!
//! Read-only review of survey progress: quota fill, retailer fill counts,
//! completion metrics and individual respondent records.

use axum::Router;
use chrono::{DateTime, Utc};
use gss_common::config::AdminCredentials;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (read-only)
    pub db: SqlitePool,
    /// Login credentials; None disables login
    pub credentials: Option<AdminCredentials>,
    /// Live session tokens and their expiry
    pub sessions: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, credentials: Option<AdminCredentials>) -> Self {
        Self {
            db,
            credentials,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Build application router
///
/// Health and login are public; everything under /api requires a session.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/api/dashboard", get(api::get_dashboard))
        .route("/api/respondents", get(api::list_respondents))
        .route("/api/respondents/:id", get(api::get_respondent_detail))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/admin/login", post(api::login))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
