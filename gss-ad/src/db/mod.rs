//! Database access layer for gss-ad
//!
//! All connections are read-only; the survey service owns every write.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

mod metrics;
mod respondents;

pub use metrics::{dashboard, CompletionMetrics, Dashboard, Demographics, QcFlagCounts};
pub use respondents::{count_respondents, list_respondents, RespondentSummary};

/// Connect to the survey database in read-only mode
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}\nStart gss-sv first to initialize the database.",
            db_path.display()
        );
    }

    // mode=ro only; the database is live (WAL) while gss-sv writes to it
    let db_url = format!("sqlite://{}?mode=ro", db_path.display());

    let pool = SqlitePool::connect(&db_url)
        .await
        .context("Failed to connect to database in read-only mode")?;

    Ok(pool)
}
