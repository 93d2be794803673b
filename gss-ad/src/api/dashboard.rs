//! Dashboard summary endpoint

use axum::{extract::State, Json};

use crate::db::{self, Dashboard};
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/dashboard
///
/// Quota fill per segment, retailer fill counts (least filled first),
/// completion metrics, collapsed demographics and QC flag counts.
pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Json<Dashboard>> {
    Ok(Json(db::dashboard(&state.db).await?))
}
