//! Segment classification and collapsed answer helpers
//!
//! `classify_segment` is the only place a respondent's segment is derived.
//! Everything that needs a segment (quota gate, assignment override, block 5
//! and block 6 branching) takes the value it returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::TARGET_BRAND;
use crate::{Error, Result};

/// Respondent classification driving quotas and branching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    PrimaryShopper,
    SecondaryShopper,
    Lapsed,
    AwareNonCustomer,
    UnawareNonCustomer,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::PrimaryShopper,
        Segment::SecondaryShopper,
        Segment::Lapsed,
        Segment::AwareNonCustomer,
        Segment::UnawareNonCustomer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::PrimaryShopper => "primary_shopper",
            Segment::SecondaryShopper => "secondary_shopper",
            Segment::Lapsed => "lapsed",
            Segment::AwareNonCustomer => "aware_non_customer",
            Segment::UnawareNonCustomer => "unaware_non_customer",
        }
    }

    /// Current shoppers of the target brand (churn-risk branch, brand frequency)
    pub fn is_customer(&self) -> bool {
        matches!(self, Segment::PrimaryShopper | Segment::SecondaryShopper)
    }

    /// Aware or lapsed non-customers (acquisition-trigger branch)
    pub fn is_prospect(&self) -> bool {
        matches!(self, Segment::Lapsed | Segment::AwareNonCustomer)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Segment::ALL
            .into_iter()
            .find(|seg| seg.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown segment: {}", s)))
    }
}

/// Funnel stage 1..=6 for one retailer
///
/// 1 = not aware, 2 = aware, 3 = considered, 4 = shopped over 12 months ago,
/// 5 = shopped in last 12 months, 6 = shopped in last 3 months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct FunnelStage(u8);

impl FunnelStage {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 6;

    pub fn value(self) -> u8 {
        self.0
    }

    /// Shopped in the last 12 months (stage 5 or 6)
    pub fn is_recent(self) -> bool {
        self.0 >= 5
    }

    /// Shopped in the last 3 months
    pub fn is_last_3_months(self) -> bool {
        self.0 == 6
    }
}

impl TryFrom<i64> for FunnelStage {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(FunnelStage(value as u8))
        } else {
            Err(Error::InvalidInput(format!(
                "Funnel stage must be 1-6, got {}",
                value
            )))
        }
    }
}

impl From<FunnelStage> for i64 {
    fn from(stage: FunnelStage) -> i64 {
        stage.0 as i64
    }
}

/// Classify a respondent from the target brand's funnel stage and the
/// primary store from share of wallet.
pub fn classify_segment(target_stage: FunnelStage, primary_store: Option<&str>) -> Segment {
    match target_stage.value() {
        6 if primary_store == Some(TARGET_BRAND) => Segment::PrimaryShopper,
        6 => Segment::SecondaryShopper,
        4 | 5 => Segment::Lapsed,
        2 | 3 => Segment::AwareNonCustomer,
        _ => Segment::UnawareNonCustomer,
    }
}

/// Classify from an unchecked stage value.
///
/// Out-of-range stages are rejected with `InvalidInput` rather than mapped to
/// a default segment.
pub fn classify_segment_raw(target_stage: i64, primary_store: Option<&str>) -> Result<Segment> {
    let stage = FunnelStage::try_from(target_stage)?;
    Ok(classify_segment(stage, primary_store))
}

pub fn collapse_income(income: i64) -> Option<&'static str> {
    match income {
        1 | 2 => Some("under_50k"),
        3 | 4 => Some("50_to_100k"),
        5 | 6 => Some("over_100k"),
        _ => None,
    }
}

pub fn collapse_age(age: i64) -> Option<&'static str> {
    match age {
        2 | 3 => Some("under_35"),
        4 | 5 => Some("35_to_54"),
        6 | 7 => Some("55_plus"),
        _ => None,
    }
}

pub fn collapse_household(household: i64) -> &'static str {
    match household {
        1 => "single",
        2 => "couple",
        3 | 4 => "family",
        _ => "other",
    }
}

pub fn collapse_channel(channel: i64) -> &'static str {
    match channel {
        1 | 2 => "in_store",
        3 => "hybrid",
        _ => "online",
    }
}

/// NPS bucket for a 0-10 likelihood score
pub fn nps_category(score: i64) -> &'static str {
    if score >= 9 {
        "promoter"
    } else if score >= 7 {
        "passive"
    } else {
        "detractor"
    }
}
