//! Trade-area ZIP lookup endpoint

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use gss_common::db::{lookup_zip, ZipLookup};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZipLookupRequest {
    pub zip_code: String,
}

/// POST /api/zip-lookup
///
/// Malformed and unknown ZIP codes both answer `{"valid": false}`.
pub async fn zip_lookup(
    State(state): State<AppState>,
    payload: Result<Json<ZipLookupRequest>, JsonRejection>,
) -> ApiResult<Json<ZipLookup>> {
    let Json(request) = payload?;
    let result = lookup_zip(&state.db, request.zip_code.trim()).await?;
    Ok(Json(result))
}

pub fn zip_routes() -> Router<AppState> {
    Router::new().route("/api/zip-lookup", post(zip_lookup))
}
