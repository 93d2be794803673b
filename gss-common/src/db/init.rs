//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas on
//! every pooled connection, creates tables idempotently and seeds the quota
//! and fill-count tables.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::catalog::{QuotaTarget, RETAILERS};
use crate::segment::Segment;
use crate::Result;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// SQLite busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (creating if needed) the survey database and bring the schema up.
///
/// `quotas` seeds `segment_quotas` for segments that have no row yet;
/// existing counters are never reset.
pub async fn init_database(db_path: &Path, quotas: &[(Segment, QuotaTarget)]) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema_version_table(&pool).await?;
    create_respondents_table(&pool).await?;
    create_segment_quotas_table(&pool).await?;
    create_retailer_fill_counts_table(&pool).await?;
    create_zip_lookup_table(&pool).await?;

    record_schema_version(&pool).await?;
    seed_segment_quotas(&pool, quotas).await?;
    seed_retailer_fill_counts(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_respondents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS respondents (
            respondent_id TEXT PRIMARY KEY,
            panel_source TEXT NOT NULL DEFAULT 'direct',
            phase INTEGER NOT NULL CHECK (phase IN (1, 2)),
            device_type TEXT,
            start_timestamp TEXT NOT NULL,
            end_timestamp TEXT,
            duration_seconds INTEGER,
            current_block TEXT NOT NULL DEFAULT 'consent',
            completion_status TEXT NOT NULL DEFAULT 'in_progress'
                CHECK (completion_status IN ('in_progress', 'complete', 'terminated')),
            termination_point TEXT,
            segment TEXT,
            quota_admitted INTEGER NOT NULL DEFAULT 0,
            primary_store TEXT,
            nps_r1_store TEXT,
            nps_r2_store TEXT,
            nps_r3_store TEXT,
            answers TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_respondents_status ON respondents(completion_status)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_respondents_segment ON respondents(segment)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_segment_quotas_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segment_quotas (
            segment TEXT PRIMARY KEY,
            current_count INTEGER NOT NULL DEFAULT 0 CHECK (current_count >= 0),
            min_target INTEGER NOT NULL,
            max_target INTEGER NOT NULL,
            CHECK (current_count <= max_target)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_retailer_fill_counts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retailer_fill_counts (
            retailer_code TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_zip_lookup_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS zip_lookup (
            zip_code TEXT PRIMARY KEY,
            dma TEXT NOT NULL,
            state TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn seed_segment_quotas(pool: &SqlitePool, quotas: &[(Segment, QuotaTarget)]) -> Result<()> {
    for (segment, target) in quotas {
        sqlx::query(
            "INSERT OR IGNORE INTO segment_quotas (segment, current_count, min_target, max_target) VALUES (?, 0, ?, ?)",
        )
        .bind(segment.as_str())
        .bind(target.min)
        .bind(target.max)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_retailer_fill_counts(pool: &SqlitePool) -> Result<()> {
    for retailer in RETAILERS {
        sqlx::query("INSERT OR IGNORE INTO retailer_fill_counts (retailer_code, count) VALUES (?, 0)")
            .bind(retailer.code)
            .execute(pool)
            .await?;
    }

    Ok(())
}
