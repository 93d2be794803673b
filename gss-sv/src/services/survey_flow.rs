//! Survey flow orchestration
//!
//! Applies one block submission against the durable respondent record:
//! load record, run the pure transition, then persist. Every write names
//! the block it was validated against, so of two concurrent submissions
//! for the same block only one is applied and the other gets
//! `InvalidState`. Quota admission and retailer assignment after S8 run
//! here in strict order, after the segment was persisted by S4.

use gss_common::assignment::{assign_retailers, RetailerAssignment};
use gss_common::catalog;
use gss_common::db::{
    admit_and_advance, create_respondent, finalize_at, get_respondent, lookup_zip, terminate_at,
    terminate_respondent, update_respondent, CompletionStatus, RespondentRecord,
    RespondentUpdate,
};
use gss_common::device::detect_device;
use gss_common::flow::{next, BlockAnswers, FlowContext, FlowState, TerminationReason, ZipAnswers};
use gss_common::sow::SowEntry;
use gss_common::{Error, Result, Segment};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::AppState;

/// Panel source recorded when the entry link carries none
pub const DEFAULT_PANEL_SOURCE: &str = "direct";

/// Parameters of a new survey session
#[derive(Debug, Clone, Default)]
pub struct InitParams {
    pub respondent_id: String,
    pub panel_source: Option<String>,
    pub phase: Option<i64>,
    pub user_agent: Option<String>,
}

/// What a renderer needs to show or resume a respondent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub respondent_id: String,
    pub current_block: String,
    pub completion_status: CompletionStatus,
    pub progress: f64,
    pub segment: Option<Segment>,
    pub assigned_retailers: Vec<String>,
    pub sow_stores: Vec<SowEntry>,
    pub stores_last_3m: Vec<String>,
    pub termination_point: Option<String>,
    /// Respondent-facing message once terminated
    pub message: Option<&'static str>,
}

impl Progress {
    pub fn from_record(record: &RespondentRecord) -> Result<Self> {
        let state = FlowState::from_record(record)?;
        let ctx = FlowContext::from_record(record);
        let message = match state {
            FlowState::Terminated(reason) => Some(reason.message()),
            _ => None,
        };

        Ok(Self {
            respondent_id: record.respondent_id.clone(),
            current_block: state.cursor().to_string(),
            completion_status: record.completion_status,
            progress: state.progress(),
            segment: record.segment,
            assigned_retailers: record.assigned_retailers(),
            sow_stores: ctx.sow_stores,
            stores_last_3m: ctx.stores_last_3m,
            termination_point: record.termination_point.clone(),
            message,
        })
    }
}

/// Start a survey session for a new respondent
pub async fn init_respondent(pool: &SqlitePool, params: InitParams) -> Result<RespondentRecord> {
    let respondent_id = params.respondent_id.trim();
    if respondent_id.is_empty() {
        return Err(Error::InvalidInput("Respondent id must not be empty".to_string()));
    }
    let phase = params.phase.unwrap_or(1);
    if !(1..=2).contains(&phase) {
        return Err(Error::InvalidInput(format!("Phase must be 1 or 2, got {}", phase)));
    }
    let panel_source = params
        .panel_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_PANEL_SOURCE);
    let device = detect_device(params.user_agent.as_deref().unwrap_or_default());

    let record = RespondentRecord::new(
        respondent_id,
        panel_source,
        phase,
        Some(device.to_string()),
        gss_common::time::now(),
    );
    create_respondent(pool, &record).await?;
    Ok(record)
}

/// Current position and context of a respondent
pub async fn get_progress(pool: &SqlitePool, respondent_id: &str) -> Result<Progress> {
    let record = get_respondent(pool, respondent_id).await?;
    Progress::from_record(&record)
}

/// Apply one block's answers and advance the respondent
pub async fn submit_answers(
    state: &AppState,
    respondent_id: &str,
    answers: &BlockAnswers,
) -> Result<Progress> {
    let pool = &state.db;
    let record = get_respondent(pool, respondent_id).await?;
    let current = FlowState::from_record(&record)?;

    let mut ctx = FlowContext::from_record(&record);
    if let BlockAnswers::Zip(ZipAnswers { zip_code }) = answers {
        ctx = ctx.with_zip(lookup_zip(pool, zip_code.trim()).await?);
    }

    let transition = match next(current, &ctx, answers) {
        Ok(transition) => transition,
        Err(e) => {
            debug!(respondent_id = %respondent_id, block = %answers.block(), error = %e, "Submission rejected");
            return Err(e);
        }
    };

    let from_block = current.cursor();
    let next_state = transition.next;
    let record = match next_state {
        FlowState::Terminated(reason) => {
            terminate_at(pool, respondent_id, from_block, reason.code(), &transition.updates)
                .await?
        }
        FlowState::Complete => {
            finalize_at(pool, respondent_id, from_block, &transition.updates).await?
        }
        FlowState::At(block) if transition.requires_admission => {
            admit_and_assign(state, &record, from_block, block.as_str(), transition.updates)
                .await?
        }
        FlowState::At(block) => {
            let update = RespondentUpdate {
                expected_block: Some(from_block.to_string()),
                current_block: Some(block.as_str().to_string()),
                segment: transition.segment,
                primary_store: transition.primary_store,
                retailers: None,
                answers: transition.updates,
            };
            update_respondent(pool, respondent_id, &update).await?;
            get_respondent(pool, respondent_id).await?
        }
    };

    Progress::from_record(&record)
}

/// Claim a quota place and move from `from_block` to `next_block`, then
/// assign R1..R3 and store `answers` with the slots.
///
/// The admission moves the cursor, so only the submission that wins it
/// draws retailers and touches the fill counters. A full segment
/// terminates the respondent with `quota_full`, keeping `answers`.
async fn admit_and_assign(
    state: &AppState,
    record: &RespondentRecord,
    from_block: &str,
    next_block: &str,
    mut answers: Map<String, Value>,
) -> Result<RespondentRecord> {
    let pool = &state.db;
    let respondent_id = record.respondent_id.as_str();
    let segment = record
        .segment
        .ok_or_else(|| Error::InvalidState(format!("Respondent {} has not been classified", respondent_id)))?;

    if !admit_and_advance(pool, respondent_id, segment, from_block, next_block).await? {
        return terminate_at(
            pool,
            respondent_id,
            from_block,
            TerminationReason::QuotaFull.code(),
            &answers,
        )
        .await;
    }

    let assignment = match record.primary_store.as_deref() {
        Some(primary) if catalog::is_named_retailer(primary) => {
            let ctx = FlowContext::from_record(record);
            assign_retailers(
                state.ledger.as_ref(),
                respondent_id,
                &ctx.stores_last_3m,
                primary,
                segment,
            )
            .await?
        }
        _ => {
            info!(respondent_id = %respondent_id, "No primary store, retailer slots left empty");
            RetailerAssignment::default()
        }
    };

    answers.extend(assigned_names(&assignment));
    let update = RespondentUpdate {
        expected_block: Some(next_block.to_string()),
        retailers: Some(assignment.slots()),
        answers,
        ..Default::default()
    };
    update_respondent(pool, respondent_id, &update).await?;
    get_respondent(pool, respondent_id).await
}

/// Display names of the assigned retailers, for export alongside the codes
fn assigned_names(assignment: &RetailerAssignment) -> Map<String, Value> {
    assignment
        .slots()
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let name = slot
                .as_deref()
                .map(|code| Value::from(catalog::retailer_display(code)))
                .unwrap_or(Value::Null);
            (format!("nps_r{}_store_name", i + 1), name)
        })
        .collect()
}

/// Terminate a respondent on the client's request
pub async fn terminate(
    pool: &SqlitePool,
    respondent_id: &str,
    reason: &str,
    partial_answers: &Map<String, Value>,
) -> Result<Progress> {
    let reason: TerminationReason = reason.parse()?;
    let record = terminate_respondent(pool, respondent_id, reason.code(), partial_answers).await?;
    Progress::from_record(&record)
}
