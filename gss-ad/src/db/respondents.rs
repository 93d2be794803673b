//! Respondent listing for the review table

use gss_common::Result;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

/// One row of the respondent table
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RespondentSummary {
    pub respondent_id: String,
    pub panel_source: String,
    pub phase: i64,
    pub device_type: Option<String>,
    pub start_timestamp: String,
    pub end_timestamp: Option<String>,
    pub duration_seconds: Option<i64>,
    pub current_block: String,
    pub completion_status: String,
    pub termination_point: Option<String>,
    pub segment: Option<String>,
    pub primary_store: Option<String>,
}

pub async fn count_respondents(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM respondents")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Newest respondents first
pub async fn list_respondents(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<RespondentSummary>> {
    let rows = sqlx::query_as::<_, RespondentSummary>(
        r#"
        SELECT respondent_id, panel_source, phase, device_type, start_timestamp,
               end_timestamp, duration_seconds, current_block, completion_status,
               termination_point, segment, primary_store
        FROM respondents
        ORDER BY start_timestamp DESC, respondent_id ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
