//! Respondent record store
//!
//! All mutations are guarded in SQL: only `in_progress` rows are written,
//! `segment` can be set once, and flow writes name the cursor they were
//! validated against so a concurrent submission of the same block loses. A guarded write that matches no row is
//! explained by re-reading the record (not found vs. invalid state).

use serde_json::{Map, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::models::{CompletionStatus, RespondentRecord};
use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::quality::compute_quality_flags;
use crate::segment::Segment;
use crate::time::{duration_seconds, now};
use crate::{Error, Result};

const SELECT_RESPONDENT: &str = r#"
    SELECT respondent_id, panel_source, phase, device_type, start_timestamp,
           end_timestamp, duration_seconds, current_block, completion_status,
           termination_point, segment, quota_admitted, primary_store,
           nps_r1_store, nps_r2_store, nps_r3_store, answers
    FROM respondents
"#;

/// Partial update of an in-progress respondent.
///
/// `None` leaves a column untouched. `answers` is merged key by key; a JSON
/// null removes the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RespondentUpdate {
    /// Cursor the record must still be at; None skips the check
    pub expected_block: Option<String>,
    pub current_block: Option<String>,
    pub segment: Option<Segment>,
    pub primary_store: Option<String>,
    /// All three assignment slots, written together
    pub retailers: Option<[Option<String>; 3]>,
    pub answers: Map<String, Value>,
}

impl RespondentUpdate {
    pub fn answers(answers: Map<String, Value>) -> Self {
        Self {
            answers,
            ..Default::default()
        }
    }
}

/// Insert a new respondent. An existing id is `Error::Duplicate`.
pub async fn create_respondent(pool: &SqlitePool, record: &RespondentRecord) -> Result<()> {
    let answers = Value::Object(record.answers.clone()).to_string();
    let result = sqlx::query(
        r#"
        INSERT INTO respondents (
            respondent_id, panel_source, phase, device_type, start_timestamp,
            current_block, completion_status, answers, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.respondent_id)
    .bind(&record.panel_source)
    .bind(record.phase)
    .bind(&record.device_type)
    .bind(record.start_timestamp.to_rfc3339())
    .bind(&record.current_block)
    .bind(record.completion_status.as_str())
    .bind(answers)
    .bind(now().to_rfc3339())
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            info!(
                respondent_id = %record.respondent_id,
                panel_source = %record.panel_source,
                phase = record.phase,
                "Respondent created"
            );
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(Error::Duplicate(record.respondent_id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch a respondent by id
pub async fn get_respondent(pool: &SqlitePool, respondent_id: &str) -> Result<RespondentRecord> {
    find_respondent(pool, respondent_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Respondent {}", respondent_id)))
}

/// Fetch a respondent by id, None if absent
pub async fn find_respondent(
    pool: &SqlitePool,
    respondent_id: &str,
) -> Result<Option<RespondentRecord>> {
    let row = sqlx::query(&format!("{} WHERE respondent_id = ?", SELECT_RESPONDENT))
        .bind(respondent_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(RespondentRecord::from_row).transpose()
}

/// Apply a partial update to an in-progress respondent.
///
/// Fails with `InvalidState` if the record is terminal or the update would
/// change an already-set segment.
pub async fn update_respondent(
    pool: &SqlitePool,
    respondent_id: &str,
    update: &RespondentUpdate,
) -> Result<()> {
    let rows = retry_on_lock("respondent update", DEFAULT_MAX_LOCK_WAIT_MS, || {
        update_once(pool, respondent_id, update)
    })
    .await?;

    if rows == 0 {
        return Err(explain_rejected_write(
            pool,
            respondent_id,
            update.segment,
            update.expected_block.as_deref(),
        )
        .await);
    }

    debug!(
        respondent_id = %respondent_id,
        fields = update.answers.len(),
        current_block = ?update.current_block,
        "Respondent updated"
    );
    Ok(())
}

async fn update_once(
    pool: &SqlitePool,
    respondent_id: &str,
    update: &RespondentUpdate,
) -> Result<u64> {
    let segment = update.segment.map(|s| s.as_str());
    let (set_retailers, [r1, r2, r3]) = match &update.retailers {
        Some(slots) => (true, slots.clone()),
        None => (false, [None, None, None]),
    };

    let result = sqlx::query(
        r#"
        UPDATE respondents SET
            current_block = COALESCE(?, current_block),
            segment = COALESCE(?, segment),
            primary_store = COALESCE(?, primary_store),
            nps_r1_store = CASE WHEN ? THEN ? ELSE nps_r1_store END,
            nps_r2_store = CASE WHEN ? THEN ? ELSE nps_r2_store END,
            nps_r3_store = CASE WHEN ? THEN ? ELSE nps_r3_store END,
            answers = json_patch(answers, ?),
            updated_at = ?
        WHERE respondent_id = ?
          AND completion_status = 'in_progress'
          AND (? IS NULL OR segment IS NULL OR segment = ?)
          AND (? IS NULL OR current_block = ?)
        "#,
    )
    .bind(&update.current_block)
    .bind(segment)
    .bind(&update.primary_store)
    .bind(set_retailers)
    .bind(r1)
    .bind(set_retailers)
    .bind(r2)
    .bind(set_retailers)
    .bind(r3)
    .bind(Value::Object(update.answers.clone()).to_string())
    .bind(now().to_rfc3339())
    .bind(respondent_id)
    .bind(segment)
    .bind(segment)
    .bind(&update.expected_block)
    .bind(&update.expected_block)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Complete a respondent: merge final answers, stamp end time and duration,
/// compute quality flags once and move the cursor to `complete`.
pub async fn finalize_respondent(
    pool: &SqlitePool,
    respondent_id: &str,
    final_answers: &Map<String, Value>,
) -> Result<RespondentRecord> {
    close(pool, respondent_id, None, final_answers, Closing::Complete).await
}

/// `finalize_respondent` for a respondent still at `block`
pub async fn finalize_at(
    pool: &SqlitePool,
    respondent_id: &str,
    block: &str,
    final_answers: &Map<String, Value>,
) -> Result<RespondentRecord> {
    close(pool, respondent_id, Some(block), final_answers, Closing::Complete).await
}

/// Terminate a respondent with a reason code, merging any partial answers
pub async fn terminate_respondent(
    pool: &SqlitePool,
    respondent_id: &str,
    reason: &str,
    partial_answers: &Map<String, Value>,
) -> Result<RespondentRecord> {
    close(pool, respondent_id, None, partial_answers, Closing::Terminated(reason)).await
}

/// `terminate_respondent` for a respondent still at `block`
pub async fn terminate_at(
    pool: &SqlitePool,
    respondent_id: &str,
    block: &str,
    reason: &str,
    partial_answers: &Map<String, Value>,
) -> Result<RespondentRecord> {
    close(pool, respondent_id, Some(block), partial_answers, Closing::Terminated(reason)).await
}

#[derive(Clone, Copy)]
enum Closing<'a> {
    Complete,
    Terminated(&'a str),
}

async fn close(
    pool: &SqlitePool,
    respondent_id: &str,
    expected_block: Option<&str>,
    answers: &Map<String, Value>,
    closing: Closing<'_>,
) -> Result<RespondentRecord> {
    let record = retry_on_lock("respondent close", DEFAULT_MAX_LOCK_WAIT_MS, || {
        close_once(pool, respondent_id, expected_block, answers, closing)
    })
    .await?;

    match closing {
        Closing::Complete => info!(
            respondent_id = %respondent_id,
            duration_seconds = record.duration_seconds,
            segment = ?record.segment,
            "Respondent completed"
        ),
        Closing::Terminated(reason) => info!(
            respondent_id = %respondent_id,
            reason = %reason,
            "Respondent terminated"
        ),
    }
    Ok(record)
}

async fn close_once(
    pool: &SqlitePool,
    respondent_id: &str,
    expected_block: Option<&str>,
    answers: &Map<String, Value>,
    closing: Closing<'_>,
) -> Result<RespondentRecord> {
    let mut tx = pool.begin().await?;

    // Leading write takes the write lock before the record is read
    let merged = sqlx::query(
        r#"
        UPDATE respondents SET answers = json_patch(answers, ?), updated_at = ?
        WHERE respondent_id = ? AND completion_status = 'in_progress'
          AND (? IS NULL OR current_block = ?)
        "#,
    )
    .bind(Value::Object(answers.clone()).to_string())
    .bind(now().to_rfc3339())
    .bind(respondent_id)
    .bind(expected_block)
    .bind(expected_block)
    .execute(&mut *tx)
    .await?;

    if merged.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(explain_rejected_write(pool, respondent_id, None, expected_block).await);
    }

    let mut record = read_in_tx(&mut tx, respondent_id).await?;
    let end = now();
    record.end_timestamp = Some(end);
    record.duration_seconds = Some(duration_seconds(record.start_timestamp, end));

    match closing {
        Closing::Complete => {
            record.completion_status = CompletionStatus::Complete;
            record.current_block = "complete".to_string();
            let flags = compute_quality_flags(&record);
            record.answers.extend(flags.to_fields());
        }
        Closing::Terminated(reason) => {
            record.completion_status = CompletionStatus::Terminated;
            record.current_block = "terminated".to_string();
            record.termination_point = Some(reason.to_string());
        }
    }

    sqlx::query(
        r#"
        UPDATE respondents SET
            completion_status = ?,
            current_block = ?,
            termination_point = ?,
            end_timestamp = ?,
            duration_seconds = ?,
            answers = ?,
            updated_at = ?
        WHERE respondent_id = ?
        "#,
    )
    .bind(record.completion_status.as_str())
    .bind(&record.current_block)
    .bind(&record.termination_point)
    .bind(end.to_rfc3339())
    .bind(record.duration_seconds)
    .bind(Value::Object(record.answers.clone()).to_string())
    .bind(end.to_rfc3339())
    .bind(respondent_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(record)
}

async fn read_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    respondent_id: &str,
) -> Result<RespondentRecord> {
    let row = sqlx::query(&format!("{} WHERE respondent_id = ?", SELECT_RESPONDENT))
        .bind(respondent_id)
        .fetch_one(&mut **tx)
        .await?;
    RespondentRecord::from_row(&row)
}

/// Work out why a guarded write touched no row
pub(crate) async fn explain_rejected_write(
    pool: &SqlitePool,
    respondent_id: &str,
    segment: Option<Segment>,
    expected_block: Option<&str>,
) -> Error {
    match find_respondent(pool, respondent_id).await {
        Err(e) => e,
        Ok(None) => Error::NotFound(format!("Respondent {}", respondent_id)),
        Ok(Some(record)) if record.completion_status.is_terminal() => Error::InvalidState(format!(
            "Respondent {} is already {}",
            respondent_id, record.completion_status
        )),
        Ok(Some(record))
            if expected_block.is_some_and(|block| block != record.current_block) =>
        {
            Error::InvalidState(format!(
                "Respondent {} is at {}, not {}",
                respondent_id,
                record.current_block,
                expected_block.unwrap_or_default()
            ))
        }
        Ok(Some(record)) => match (record.segment, segment) {
            (Some(existing), Some(requested)) if existing != requested => {
                Error::InvalidState(format!(
                    "Respondent {} already classified as {}",
                    respondent_id, existing
                ))
            }
            (None, Some(_)) => Error::InvalidState(format!(
                "Respondent {} has not been classified",
                respondent_id
            )),
            _ => Error::Internal(format!(
                "Update of respondent {} matched no row",
                respondent_id
            )),
        },
    }
}
