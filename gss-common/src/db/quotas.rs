//! Segment quota gate
//!
//! Admission is a single conditional increment; SQLite evaluates the
//! `current_count < max_target` guard and the increment as one statement,
//! so concurrent callers can never push a counter past its maximum.

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::models::SegmentQuota;
use super::respondents::explain_rejected_write;
use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::segment::Segment;
use crate::{Error, Result};

/// Claim one place in a segment's quota.
///
/// Returns false, without mutating anything, when the segment is full.
pub async fn try_admit(pool: &SqlitePool, segment: Segment) -> Result<bool> {
    let admitted = increment_if_open(pool, segment).await?;
    log_decision(segment, admitted);
    Ok(admitted)
}

async fn increment_if_open<'e, E>(executor: E, segment: Segment) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let new_count: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE segment_quotas
        SET current_count = current_count + 1
        WHERE segment = ? AND current_count < max_target
        RETURNING current_count
        "#,
    )
    .bind(segment.as_str())
    .fetch_optional(executor)
    .await?;

    Ok(new_count.is_some())
}

/// Admit a respondent at most once.
///
/// The respondent's `quota_admitted` flag and the segment counter change in
/// one transaction: a respondent already admitted gets `true` again without
/// touching the counter, and a full segment leaves both untouched.
pub async fn admit_respondent(
    pool: &SqlitePool,
    respondent_id: &str,
    segment: Segment,
) -> Result<bool> {
    admit(pool, respondent_id, segment, None).await
}

/// Admit a respondent and move its cursor from `from_block` to `to_block`
/// in the same transaction.
///
/// Only one caller can make the move: once the cursor has left
/// `from_block` every other caller gets `InvalidState`. A full segment
/// leaves the cursor at `from_block`.
pub async fn admit_and_advance(
    pool: &SqlitePool,
    respondent_id: &str,
    segment: Segment,
    from_block: &str,
    to_block: &str,
) -> Result<bool> {
    admit(pool, respondent_id, segment, Some((from_block, to_block))).await
}

async fn admit(
    pool: &SqlitePool,
    respondent_id: &str,
    segment: Segment,
    advance: Option<(&str, &str)>,
) -> Result<bool> {
    let outcome = retry_on_lock("quota admission", DEFAULT_MAX_LOCK_WAIT_MS, || {
        admit_once(pool, respondent_id, segment, advance)
    })
    .await?;

    match outcome {
        Admission::Admitted => {
            log_decision(segment, true);
            Ok(true)
        }
        Admission::AlreadyAdmitted => {
            debug!(respondent_id = %respondent_id, segment = %segment, "Respondent already admitted");
            Ok(true)
        }
        Admission::Full => {
            log_decision(segment, false);
            Ok(false)
        }
        Admission::NotEligible => Err(explain_rejected_write(
            pool,
            respondent_id,
            Some(segment),
            advance.map(|(from, _)| from),
        )
        .await),
    }
}

enum Admission {
    Admitted,
    AlreadyAdmitted,
    Full,
    NotEligible,
}

async fn admit_once(
    pool: &SqlitePool,
    respondent_id: &str,
    segment: Segment,
    advance: Option<(&str, &str)>,
) -> Result<Admission> {
    let (from_block, to_block) = advance.unzip();
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        r#"
        UPDATE respondents SET
            quota_admitted = 1,
            current_block = COALESCE(?, current_block)
        WHERE respondent_id = ?
          AND quota_admitted = 0
          AND completion_status = 'in_progress'
          AND segment = ?
          AND (? IS NULL OR current_block = ?)
        "#,
    )
    .bind(to_block)
    .bind(respondent_id)
    .bind(segment.as_str())
    .bind(from_block)
    .bind(from_block)
    .execute(&mut *tx)
    .await?;

    if claimed.rows_affected() == 0 {
        // Admitted earlier; a pending cursor move is still made here
        let moved = sqlx::query(
            r#"
            UPDATE respondents SET current_block = COALESCE(?, current_block)
            WHERE respondent_id = ?
              AND quota_admitted = 1
              AND completion_status = 'in_progress'
              AND segment = ?
              AND (? IS NULL OR current_block = ?)
            "#,
        )
        .bind(to_block)
        .bind(respondent_id)
        .bind(segment.as_str())
        .bind(from_block)
        .bind(from_block)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Admission::NotEligible);
        }
        tx.commit().await?;
        return Ok(Admission::AlreadyAdmitted);
    }

    if increment_if_open(&mut *tx, segment).await? {
        tx.commit().await?;
        Ok(Admission::Admitted)
    } else {
        tx.rollback().await?;
        Ok(Admission::Full)
    }
}

fn log_decision(segment: Segment, admitted: bool) {
    if admitted {
        debug!(segment = %segment, "Quota admission granted");
    } else {
        info!(segment = %segment, "Quota full, admission refused");
    }
}

/// All quota counters in segment order
pub async fn list_quotas(pool: &SqlitePool) -> Result<Vec<SegmentQuota>> {
    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT segment, current_count, min_target, max_target FROM segment_quotas",
    )
    .fetch_all(pool)
    .await?;

    let mut quotas = rows
        .into_iter()
        .map(|(segment, current_count, min_target, max_target)| {
            let segment = segment
                .parse::<Segment>()
                .map_err(|_| Error::Internal(format!("Unknown segment in database: {}", segment)))?;
            Ok(SegmentQuota {
                segment,
                current_count,
                min_target,
                max_target,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    quotas.sort_by_key(|q| Segment::ALL.iter().position(|s| *s == q.segment));
    Ok(quotas)
}

/// One segment's counter
pub async fn get_quota(pool: &SqlitePool, segment: Segment) -> Result<SegmentQuota> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT current_count, min_target, max_target FROM segment_quotas WHERE segment = ?",
    )
    .bind(segment.as_str())
    .fetch_optional(pool)
    .await?;

    let (current_count, min_target, max_target) =
        row.ok_or_else(|| Error::NotFound(format!("Quota for segment {}", segment)))?;

    Ok(SegmentQuota {
        segment,
        current_count,
        min_target,
        max_target,
    })
}
