//! Flow positions and terminal outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog;
use crate::db::models::{CompletionStatus, RespondentRecord};
use crate::{Error, Result};

/// A question screen awaiting answers. The string form is the durable
/// `current_block` cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    #[serde(rename = "consent")]
    Consent,
    #[serde(rename = "block1_s1")]
    S1Zip,
    #[serde(rename = "block1_s2")]
    S2DecisionMaker,
    #[serde(rename = "block1_s3")]
    S3Funnel,
    #[serde(rename = "block1_s4")]
    S4ShareOfWallet,
    #[serde(rename = "block1_s4a")]
    S4aStoreFrequency,
    #[serde(rename = "block1_s5")]
    S5SwitchedOut,
    #[serde(rename = "block1_s5a")]
    S5aSwitchedStores,
    #[serde(rename = "block1_s6")]
    S6Income,
    #[serde(rename = "block1_s7")]
    S7Age,
    #[serde(rename = "block1_s8")]
    S8Household,
    #[serde(rename = "block2")]
    Nps,
    #[serde(rename = "block3_k1")]
    KpcImportance,
    #[serde(rename = "block3_k2")]
    KpcPerformance,
    #[serde(rename = "block4")]
    SowChange,
    #[serde(rename = "block5")]
    Loyalty,
    #[serde(rename = "block6")]
    Frequency,
    #[serde(rename = "block7")]
    Macro,
    #[serde(rename = "block8")]
    Demographics,
}

impl Block {
    /// Blocks in questionnaire order
    pub const ALL: [Block; 19] = [
        Block::Consent,
        Block::S1Zip,
        Block::S2DecisionMaker,
        Block::S3Funnel,
        Block::S4ShareOfWallet,
        Block::S4aStoreFrequency,
        Block::S5SwitchedOut,
        Block::S5aSwitchedStores,
        Block::S6Income,
        Block::S7Age,
        Block::S8Household,
        Block::Nps,
        Block::KpcImportance,
        Block::KpcPerformance,
        Block::SowChange,
        Block::Loyalty,
        Block::Frequency,
        Block::Macro,
        Block::Demographics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Block::Consent => "consent",
            Block::S1Zip => "block1_s1",
            Block::S2DecisionMaker => "block1_s2",
            Block::S3Funnel => "block1_s3",
            Block::S4ShareOfWallet => "block1_s4",
            Block::S4aStoreFrequency => "block1_s4a",
            Block::S5SwitchedOut => "block1_s5",
            Block::S5aSwitchedStores => "block1_s5a",
            Block::S6Income => "block1_s6",
            Block::S7Age => "block1_s7",
            Block::S8Household => "block1_s8",
            Block::Nps => "block2",
            Block::KpcImportance => "block3_k1",
            Block::KpcPerformance => "block3_k2",
            Block::SowChange => "block4",
            Block::Loyalty => "block5",
            Block::Frequency => "block6",
            Block::Macro => "block7",
            Block::Demographics => "block8",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Block {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Block::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown block: {}", s)))
    }
}

/// Why a respondent left the survey early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// S1: ZIP outside the trade area
    OutsideTradeArea,
    /// S2: not a household grocery decision-maker
    NotDecisionMaker,
    /// S3: no retailer shopped in the last 12 months
    NoRecentShopping,
    /// S6: income "prefer not to say"
    IncomeRefused,
    /// S7: under 18
    Underage,
    /// S7: age "prefer not to say"
    AgeRefused,
    /// Segment quota already full after S8
    QuotaFull,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 7] = [
        TerminationReason::OutsideTradeArea,
        TerminationReason::NotDecisionMaker,
        TerminationReason::NoRecentShopping,
        TerminationReason::IncomeRefused,
        TerminationReason::Underage,
        TerminationReason::AgeRefused,
        TerminationReason::QuotaFull,
    ];

    /// Code stored in `termination_point`
    pub fn code(&self) -> &'static str {
        match self {
            TerminationReason::OutsideTradeArea => "S1",
            TerminationReason::NotDecisionMaker => "S2",
            TerminationReason::NoRecentShopping => "S3",
            TerminationReason::IncomeRefused => "S6_PNTS",
            TerminationReason::Underage => "S7",
            TerminationReason::AgeRefused => "S7_PNTS",
            TerminationReason::QuotaFull => "quota_full",
        }
    }

    pub fn message(&self) -> &'static str {
        catalog::termination_message(self.code())
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TerminationReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TerminationReason::ALL
            .into_iter()
            .find(|r| r.code() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown termination reason: {}", s)))
    }
}

impl Serialize for TerminationReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for TerminationReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a respondent is in the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    At(Block),
    Complete,
    Terminated(TerminationReason),
}

impl FlowState {
    pub fn initial() -> Self {
        FlowState::At(Block::Consent)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowState::At(_))
    }

    /// Value stored in `current_block`
    pub fn cursor(&self) -> &'static str {
        match self {
            FlowState::At(block) => block.as_str(),
            FlowState::Complete => "complete",
            FlowState::Terminated(_) => "terminated",
        }
    }

    /// Rebuild the state from a persisted record
    pub fn from_record(record: &RespondentRecord) -> Result<Self> {
        match record.completion_status {
            CompletionStatus::Complete => Ok(FlowState::Complete),
            CompletionStatus::Terminated => {
                let code = record.termination_point.as_deref().unwrap_or_default();
                let reason = code.parse().map_err(|_| {
                    Error::Internal(format!(
                        "Respondent {} has unknown termination point {:?}",
                        record.respondent_id, code
                    ))
                })?;
                Ok(FlowState::Terminated(reason))
            }
            CompletionStatus::InProgress => {
                let block = record.current_block.parse().map_err(|_| {
                    Error::Internal(format!(
                        "Respondent {} has unknown cursor {:?}",
                        record.respondent_id, record.current_block
                    ))
                })?;
                Ok(FlowState::At(block))
            }
        }
    }

    /// Fraction of the questionnaire behind this position
    pub fn progress(&self) -> f64 {
        catalog::block_progress(self.cursor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_cursor_round_trip() {
        for block in Block::ALL {
            assert_eq!(block.as_str().parse::<Block>().unwrap(), block);
            let json = serde_json::to_string(&block).unwrap();
            assert_eq!(json, format!("\"{}\"", block.as_str()));
        }
        assert!("block9".parse::<Block>().is_err());
    }

    #[test]
    fn test_termination_codes_round_trip() {
        for reason in TerminationReason::ALL {
            assert_eq!(reason.code().parse::<TerminationReason>().unwrap(), reason);
        }
        assert_eq!(
            serde_json::to_string(&TerminationReason::QuotaFull).unwrap(),
            "\"quota_full\""
        );
    }

    #[test]
    fn test_messages_are_neutral() {
        assert!(TerminationReason::AgeRefused
            .message()
            .starts_with("Thank you for your time"));
        assert!(TerminationReason::QuotaFull
            .message()
            .contains("enough responses"));
    }

    #[test]
    fn test_state_from_record() {
        let mut record = RespondentRecord::new("r", "direct", 1, None, crate::time::now());
        assert_eq!(FlowState::from_record(&record).unwrap(), FlowState::initial());

        record.current_block = "block3_k2".to_string();
        assert_eq!(
            FlowState::from_record(&record).unwrap(),
            FlowState::At(Block::KpcPerformance)
        );

        record.completion_status = CompletionStatus::Terminated;
        record.termination_point = Some("S7_PNTS".to_string());
        assert_eq!(
            FlowState::from_record(&record).unwrap(),
            FlowState::Terminated(TerminationReason::AgeRefused)
        );
        assert_eq!(FlowState::from_record(&record).unwrap().cursor(), "terminated");
    }

    #[test]
    fn test_progress() {
        assert_eq!(FlowState::initial().progress(), 0.0);
        assert_eq!(FlowState::At(Block::Macro).progress(), 0.95);
        assert_eq!(FlowState::Complete.progress(), 1.0);
    }
}
