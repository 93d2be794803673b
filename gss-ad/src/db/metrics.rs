//! Dashboard aggregates
//!
//! Counts are computed in SQL over the `respondents` table; collapsed
//! demographics and QC flags are read from the JSON `answers` column.

use gss_common::db::{list_fill_counts, list_quotas, RetailerFill, SegmentQuota};
use gss_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Everything the dashboard page shows
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub quotas: Vec<SegmentQuota>,
    /// Least filled first
    pub fill_counts: Vec<RetailerFill>,
    pub metrics: CompletionMetrics,
    pub demographics: Demographics,
    pub qc_flags: QcFlagCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionMetrics {
    pub total: i64,
    pub complete: i64,
    pub terminated: i64,
    pub in_progress: i64,
    /// Mean duration of completes, rounded; 0 without completes
    pub avg_duration: i64,
    pub term_breakdown: BTreeMap<String, i64>,
    pub segment_counts: BTreeMap<String, i64>,
    pub device_counts: BTreeMap<String, i64>,
}

/// Collapsed income and age of completed respondents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Demographics {
    pub income_counts: BTreeMap<String, i64>,
    pub age_counts: BTreeMap<String, i64>,
}

/// Completed respondents carrying each quality flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QcFlagCounts {
    pub speeder: i64,
    pub straightliner_k1: i64,
    pub straightliner_k2: i64,
    pub gibberish_nps: i64,
    pub gibberish_l1a: i64,
    pub gibberish_l2a: i64,
}

pub async fn dashboard(pool: &SqlitePool) -> Result<Dashboard> {
    Ok(Dashboard {
        quotas: list_quotas(pool).await?,
        fill_counts: list_fill_counts(pool).await?,
        metrics: completion_metrics(pool).await?,
        demographics: demographics(pool).await?,
        qc_flags: qc_flag_counts(pool).await?,
    })
}

async fn completion_metrics(pool: &SqlitePool) -> Result<CompletionMetrics> {
    let (total, complete, terminated, in_progress): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(completion_status = 'complete'), 0),
               COALESCE(SUM(completion_status = 'terminated'), 0),
               COALESCE(SUM(completion_status = 'in_progress'), 0)
        FROM respondents
        "#,
    )
    .fetch_one(pool)
    .await?;

    let avg_duration: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(duration_seconds) FROM respondents
        WHERE completion_status = 'complete' AND duration_seconds IS NOT NULL
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(CompletionMetrics {
        total,
        complete,
        terminated,
        in_progress,
        avg_duration: avg_duration.map(|d| d.round() as i64).unwrap_or(0),
        term_breakdown: grouped(
            pool,
            "SELECT COALESCE(termination_point, 'unknown'), COUNT(*) FROM respondents
             WHERE completion_status = 'terminated' GROUP BY 1",
        )
        .await?,
        segment_counts: grouped(
            pool,
            "SELECT segment, COUNT(*) FROM respondents WHERE segment IS NOT NULL GROUP BY 1",
        )
        .await?,
        device_counts: grouped(
            pool,
            "SELECT COALESCE(device_type, 'unknown'), COUNT(*) FROM respondents GROUP BY 1",
        )
        .await?,
    })
}

async fn demographics(pool: &SqlitePool) -> Result<Demographics> {
    Ok(Demographics {
        income_counts: grouped_answer(pool, "income_band_collapsed").await?,
        age_counts: grouped_answer(pool, "age_cohort_collapsed").await?,
    })
}

async fn qc_flag_counts(pool: &SqlitePool) -> Result<QcFlagCounts> {
    let counts: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(json_extract(answers, '$.qc_speeder') = 1), 0),
               COALESCE(SUM(json_extract(answers, '$.qc_straightliner_k1') = 1), 0),
               COALESCE(SUM(json_extract(answers, '$.qc_straightliner_k2') = 1), 0),
               COALESCE(SUM(json_extract(answers, '$.qc_gibberish_nps') = 1), 0),
               COALESCE(SUM(json_extract(answers, '$.qc_gibberish_l1a') = 1), 0),
               COALESCE(SUM(json_extract(answers, '$.qc_gibberish_l2a') = 1), 0)
        FROM respondents
        WHERE completion_status = 'complete'
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(QcFlagCounts {
        speeder: counts.0,
        straightliner_k1: counts.1,
        straightliner_k2: counts.2,
        gibberish_nps: counts.3,
        gibberish_l1a: counts.4,
        gibberish_l2a: counts.5,
    })
}

/// Run a `SELECT key, COUNT(*) ... GROUP BY 1` query
async fn grouped(pool: &SqlitePool, sql: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

/// Count completes per value of one answer field, skipping missing values
async fn grouped_answer(pool: &SqlitePool, field: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT CAST(json_extract(answers, '$.' || ?) AS TEXT) AS value, COUNT(*)
        FROM respondents
        WHERE completion_status = 'complete' AND value IS NOT NULL
        GROUP BY value
        "#,
    )
    .bind(field)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}
