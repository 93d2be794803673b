//! Trade-area ZIP lookup

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::{is_zip_format, ZipEntry};
use crate::Result;

/// Result of a ZIP lookup. `dma`/`state` are set only when valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipLookup {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dma: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ZipLookup {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            dma: None,
            state: None,
        }
    }
}

/// Load trade-area entries, replacing any existing row for the same ZIP
pub async fn seed_zip_codes(pool: &SqlitePool, entries: &[ZipEntry]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query("INSERT OR REPLACE INTO zip_lookup (zip_code, dma, state) VALUES (?, ?, ?)")
            .bind(&entry.code)
            .bind(&entry.dma)
            .bind(&entry.state)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!("Loaded {} trade-area ZIP codes", entries.len());
    Ok(())
}

/// Look up a ZIP code. Malformed codes are simply not valid.
pub async fn lookup_zip(pool: &SqlitePool, zip_code: &str) -> Result<ZipLookup> {
    if !is_zip_format(zip_code) {
        return Ok(ZipLookup::invalid());
    }

    let row: Option<(String, String)> =
        sqlx::query_as("SELECT dma, state FROM zip_lookup WHERE zip_code = ?")
            .bind(zip_code)
            .fetch_optional(pool)
            .await?;

    Ok(match row {
        Some((dma, state)) => ZipLookup {
            valid: true,
            dma: Some(dma),
            state: Some(state),
        },
        None => ZipLookup::invalid(),
    })
}
