//! Survey flow endpoints
//!
//! - `POST /api/survey/init` starts a respondent at `consent`
//! - `GET /api/survey/:id/progress` resumes at the durable cursor
//! - `POST /api/survey/:id/submit` answers the current block
//! - `POST /api/survey/:id/terminate` ends the survey early

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use gss_common::flow::BlockAnswers;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::ApiResult;
use crate::services::survey_flow::{self, InitParams, Progress};
use crate::AppState;

/// Entry-link parameters
#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    /// Panel respondent id; a fresh UUID when absent
    #[serde(default)]
    pub respondent_id: Option<String>,
    #[serde(default)]
    pub panel_source: Option<String>,
    #[serde(default)]
    pub phase: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub respondent_id: String,
    pub current_block: String,
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminateRequest {
    pub reason: String,
    #[serde(default)]
    pub answers: Map<String, Value>,
}

/// POST /api/survey/init
pub async fn init_survey(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<InitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InitResponse>)> {
    let Json(request) = payload?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let params = InitParams {
        respondent_id: request
            .respondent_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        panel_source: request.panel_source,
        phase: request.phase,
        user_agent,
    };
    let record = survey_flow::init_respondent(&state.db, params).await?;

    Ok((
        StatusCode::CREATED,
        Json(InitResponse {
            respondent_id: record.respondent_id,
            current_block: record.current_block,
            device_type: record.device_type,
        }),
    ))
}

/// GET /api/survey/:id/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(respondent_id): Path<String>,
) -> ApiResult<Json<Progress>> {
    let progress = survey_flow::get_progress(&state.db, &respondent_id).await?;
    Ok(Json(progress))
}

/// POST /api/survey/:id/submit
///
/// Screener terminations and a full quota are normal outcomes: they answer
/// 200 with `current_block = "terminated"` and a neutral message.
pub async fn submit_block(
    State(state): State<AppState>,
    Path(respondent_id): Path<String>,
    payload: Result<Json<BlockAnswers>, JsonRejection>,
) -> ApiResult<Json<Progress>> {
    let Json(answers) = payload?;
    let progress = survey_flow::submit_answers(&state, &respondent_id, &answers).await?;
    Ok(Json(progress))
}

/// POST /api/survey/:id/terminate
pub async fn terminate_survey(
    State(state): State<AppState>,
    Path(respondent_id): Path<String>,
    payload: Result<Json<TerminateRequest>, JsonRejection>,
) -> ApiResult<Json<Progress>> {
    let Json(request) = payload?;
    let progress =
        survey_flow::terminate(&state.db, &respondent_id, &request.reason, &request.answers)
            .await?;
    info!(respondent_id = %respondent_id, reason = %request.reason, "Terminated on client request");
    Ok(Json(progress))
}

pub fn survey_routes() -> Router<AppState> {
    Router::new()
        .route("/api/survey/init", post(init_survey))
        .route("/api/survey/:id/progress", get(get_progress))
        .route("/api/survey/:id/submit", post(submit_block))
        .route("/api/survey/:id/terminate", post(terminate_survey))
}
