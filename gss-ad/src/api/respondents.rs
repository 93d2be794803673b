//! Respondent list and detail
//!
//! The list is paginated 100 rows/page, newest first.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use gss_common::db::{get_respondent, RespondentRecord};
use serde::{Deserialize, Serialize};

use crate::db::{self, RespondentSummary};
use crate::error::ApiResult;
use crate::pagination::{Page, PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct RespondentListResponse {
    pub page: i64,
    pub page_size: i64,
    pub total_rows: i64,
    pub total_pages: i64,
    pub respondents: Vec<RespondentSummary>,
}

/// GET /api/respondents?page=N
pub async fn list_respondents(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<RespondentListResponse>> {
    let Query(query) = query?;

    let total_rows = db::count_respondents(&state.db).await?;
    let page = Page::clamp(total_rows, query.page);
    let respondents = db::list_respondents(&state.db, PAGE_SIZE, page.offset).await?;

    Ok(Json(RespondentListResponse {
        page: page.number,
        page_size: PAGE_SIZE,
        total_rows,
        total_pages: page.total_pages,
        respondents,
    }))
}

/// GET /api/respondents/:id
///
/// Full record including the answer map.
pub async fn get_respondent_detail(
    State(state): State<AppState>,
    Path(respondent_id): Path<String>,
) -> ApiResult<Json<RespondentRecord>> {
    Ok(Json(get_respondent(&state.db, &respondent_id).await?))
}
