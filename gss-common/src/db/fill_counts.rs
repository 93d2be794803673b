//! Retailer fill counters backing least-fill assignment

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use super::models::RetailerFill;
use crate::assignment::FillLedger;
use crate::Result;

/// Fill ledger stored in `retailer_fill_counts`
#[derive(Clone)]
pub struct SqliteFillLedger {
    pool: SqlitePool,
}

impl SqliteFillLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FillLedger for SqliteFillLedger {
    async fn take_least_filled(&self, candidates: &[String]) -> Result<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let candidates_json = Value::from(candidates.to_vec()).to_string();

        // Selection and increment in one statement; equal counts break randomly
        let picked: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE retailer_fill_counts
            SET count = count + 1
            WHERE retailer_code = (
                SELECT retailer_code FROM retailer_fill_counts
                WHERE retailer_code IN (SELECT value FROM json_each(?))
                ORDER BY count ASC, random()
                LIMIT 1
            )
            RETURNING retailer_code
            "#,
        )
        .bind(candidates_json)
        .fetch_optional(&self.pool)
        .await?;

        Ok(picked)
    }

    async fn record_fill(&self, retailer: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retailer_fill_counts (retailer_code, count) VALUES (?, 1)
            ON CONFLICT(retailer_code) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(retailer)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// All fill counters, least filled first
pub async fn list_fill_counts(pool: &SqlitePool) -> Result<Vec<RetailerFill>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT retailer_code, count FROM retailer_fill_counts ORDER BY count ASC, retailer_code ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(retailer_code, count)| RetailerFill {
            retailer_code,
            count,
        })
        .collect())
}

/// One retailer's count (0 when the retailer has no row)
pub async fn get_fill_count(pool: &SqlitePool, retailer: &str) -> Result<i64> {
    let count: Option<i64> =
        sqlx::query_scalar("SELECT count FROM retailer_fill_counts WHERE retailer_code = ?")
            .bind(retailer)
            .fetch_optional(pool)
            .await?;
    Ok(count.unwrap_or(0))
}
