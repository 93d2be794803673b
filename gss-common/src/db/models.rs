//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

use crate::segment::Segment;
use crate::time::parse_timestamp;
use crate::{Error, Result};

/// Lifecycle of a respondent record. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Complete,
    Terminated,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Complete => "complete",
            CompletionStatus::Terminated => "terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionStatus::InProgress)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(CompletionStatus::InProgress),
            "complete" => Ok(CompletionStatus::Complete),
            "terminated" => Ok(CompletionStatus::Terminated),
            other => Err(Error::Internal(format!(
                "Unknown completion_status in database: {}",
                other
            ))),
        }
    }
}

/// One survey taker.
///
/// Fields the core logic reads or guards are real columns. Every other
/// answer lives in `answers`, a flat JSON object keyed by field name
/// (`zip_code`, `funnel_hyvee`, `nps_r1_score`, `qc_speeder`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondentRecord {
    pub respondent_id: String,
    pub panel_source: String,
    pub phase: i64,
    pub device_type: Option<String>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub current_block: String,
    pub completion_status: CompletionStatus,
    pub termination_point: Option<String>,
    pub segment: Option<Segment>,
    pub quota_admitted: bool,
    pub primary_store: Option<String>,
    pub nps_r1_store: Option<String>,
    pub nps_r2_store: Option<String>,
    pub nps_r3_store: Option<String>,
    pub answers: Map<String, Value>,
}

impl RespondentRecord {
    /// Fresh in-progress record positioned at consent
    pub fn new(
        respondent_id: &str,
        panel_source: &str,
        phase: i64,
        device_type: Option<String>,
        start_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            respondent_id: respondent_id.to_string(),
            panel_source: panel_source.to_string(),
            phase,
            device_type,
            start_timestamp,
            end_timestamp: None,
            duration_seconds: None,
            current_block: "consent".to_string(),
            completion_status: CompletionStatus::InProgress,
            termination_point: None,
            segment: None,
            quota_admitted: false,
            primary_store: None,
            nps_r1_store: None,
            nps_r2_store: None,
            nps_r3_store: None,
            answers: Map::new(),
        }
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let start: String = row.try_get("start_timestamp")?;
        let end: Option<String> = row.try_get("end_timestamp")?;
        let status: String = row.try_get("completion_status")?;
        let segment: Option<String> = row.try_get("segment")?;
        let answers_json: String = row.try_get("answers")?;

        let answers = match serde_json::from_str::<Value>(&answers_json) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                return Err(Error::Internal(format!("Failed to parse answers: {}", e)));
            }
        };

        Ok(Self {
            respondent_id: row.try_get("respondent_id")?,
            panel_source: row.try_get("panel_source")?,
            phase: row.try_get("phase")?,
            device_type: row.try_get("device_type")?,
            start_timestamp: parse_timestamp("start_timestamp", &start)?,
            end_timestamp: end
                .map(|e| parse_timestamp("end_timestamp", &e))
                .transpose()?,
            duration_seconds: row.try_get("duration_seconds")?,
            current_block: row.try_get("current_block")?,
            completion_status: status.parse()?,
            termination_point: row.try_get("termination_point")?,
            segment: segment
                .map(|s| {
                    s.parse::<Segment>()
                        .map_err(|_| Error::Internal(format!("Unknown segment in database: {}", s)))
                })
                .transpose()?,
            quota_admitted: row.try_get::<i64, _>("quota_admitted")? != 0,
            primary_store: row.try_get("primary_store")?,
            nps_r1_store: row.try_get("nps_r1_store")?,
            nps_r2_store: row.try_get("nps_r2_store")?,
            nps_r3_store: row.try_get("nps_r3_store")?,
            answers,
        })
    }

    pub fn answer(&self, key: &str) -> Option<&Value> {
        self.answers.get(key).filter(|v| !v.is_null())
    }

    pub fn answer_i64(&self, key: &str) -> Option<i64> {
        self.answer(key).and_then(Value::as_i64)
    }

    pub fn answer_str(&self, key: &str) -> Option<&str> {
        self.answer(key).and_then(Value::as_str)
    }

    /// Assigned retailers in slot order, skipping empty slots
    pub fn assigned_retailers(&self) -> Vec<String> {
        [&self.nps_r1_store, &self.nps_r2_store, &self.nps_r3_store]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Quota counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentQuota {
    pub segment: Segment,
    pub current_count: i64,
    pub min_target: i64,
    pub max_target: i64,
}

impl SegmentQuota {
    pub fn is_full(&self) -> bool {
        self.current_count >= self.max_target
    }
}

/// Retailer fill counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerFill {
    pub retailer_code: String,
    pub count: i64,
}
