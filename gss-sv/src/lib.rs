//! gss-sv library - survey service
//!
//! Drives respondents through the questionnaire. Each request loads the
//! durable respondent record, applies one block's answers and persists the
//! outcome; no per-respondent state lives in the process.

use axum::Router;
use gss_common::assignment::FillLedger;
use gss_common::db::SqliteFillLedger;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod services;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (read-write)
    pub db: SqlitePool,
    /// Retailer fill counters used by assignment
    pub ledger: Arc<dyn FillLedger>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        let ledger = Arc::new(SqliteFillLedger::new(db.clone()));
        Self { db, ledger }
    }

    /// State with a substitute fill ledger
    pub fn with_ledger(db: SqlitePool, ledger: Arc<dyn FillLedger>) -> Self {
        Self { db, ledger }
    }
}

/// Build application router
///
/// CORS is permissive: the questionnaire pages are hosted by the panel
/// front end, not by this service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::survey_routes())
        .merge(api::zip_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
