//! Answer payloads, one variant per block
//!
//! Submissions are tagged with the block they answer:
//! `{"block": "block1_s2", "grocery_decisionmaker": 1}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::state::Block;
use crate::sow::SowAllocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "block")]
pub enum BlockAnswers {
    #[serde(rename = "consent")]
    Consent(ConsentAnswers),
    #[serde(rename = "block1_s1")]
    Zip(ZipAnswers),
    #[serde(rename = "block1_s2")]
    DecisionMaker(DecisionMakerAnswers),
    #[serde(rename = "block1_s3")]
    Funnel(FunnelAnswers),
    #[serde(rename = "block1_s4")]
    ShareOfWallet(SowAllocation),
    #[serde(rename = "block1_s4a")]
    StoreFrequency(StoreFrequencyAnswers),
    #[serde(rename = "block1_s5")]
    SwitchedOut(SwitchedOutAnswers),
    #[serde(rename = "block1_s5a")]
    SwitchedStores(SwitchedStoresAnswers),
    #[serde(rename = "block1_s6")]
    Income(IncomeAnswers),
    #[serde(rename = "block1_s7")]
    Age(AgeAnswers),
    #[serde(rename = "block1_s8")]
    Household(HouseholdAnswers),
    #[serde(rename = "block2")]
    Nps(NpsAnswers),
    #[serde(rename = "block3_k1")]
    KpcImportance(KpcImportanceAnswers),
    #[serde(rename = "block3_k2")]
    KpcPerformance(KpcPerformanceAnswers),
    #[serde(rename = "block4")]
    SowChange(SowChangeAnswers),
    #[serde(rename = "block5")]
    Loyalty(LoyaltyAnswers),
    #[serde(rename = "block6")]
    Frequency(FrequencyAnswers),
    #[serde(rename = "block7")]
    Macro(MacroAnswers),
    #[serde(rename = "block8")]
    Demographics(DemographicsAnswers),
}

impl BlockAnswers {
    /// The block these answers belong to
    pub fn block(&self) -> Block {
        match self {
            BlockAnswers::Consent(_) => Block::Consent,
            BlockAnswers::Zip(_) => Block::S1Zip,
            BlockAnswers::DecisionMaker(_) => Block::S2DecisionMaker,
            BlockAnswers::Funnel(_) => Block::S3Funnel,
            BlockAnswers::ShareOfWallet(_) => Block::S4ShareOfWallet,
            BlockAnswers::StoreFrequency(_) => Block::S4aStoreFrequency,
            BlockAnswers::SwitchedOut(_) => Block::S5SwitchedOut,
            BlockAnswers::SwitchedStores(_) => Block::S5aSwitchedStores,
            BlockAnswers::Income(_) => Block::S6Income,
            BlockAnswers::Age(_) => Block::S7Age,
            BlockAnswers::Household(_) => Block::S8Household,
            BlockAnswers::Nps(_) => Block::Nps,
            BlockAnswers::KpcImportance(_) => Block::KpcImportance,
            BlockAnswers::KpcPerformance(_) => Block::KpcPerformance,
            BlockAnswers::SowChange(_) => Block::SowChange,
            BlockAnswers::Loyalty(_) => Block::Loyalty,
            BlockAnswers::Frequency(_) => Block::Frequency,
            BlockAnswers::Macro(_) => Block::Macro,
            BlockAnswers::Demographics(_) => Block::Demographics,
        }
    }
}

/// Consent carries nothing beyond the tag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsentAnswers {}

/// S1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZipAnswers {
    pub zip_code: String,
}

/// S2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionMakerAnswers {
    pub grocery_decisionmaker: i64,
}

/// S4a
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreFrequencyAnswers {
    /// Shopping frequency keyed by retailer code
    pub frequency: BTreeMap<String, i64>,
}

/// S5
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchedOutAnswers {
    pub switched_out_any: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncomeAnswers {
    pub income_band: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgeAnswers {
    pub age_cohort: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HouseholdAnswers {
    pub household_type: i64,
}

/// Block 2: one rating per assigned retailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NpsAnswers {
    pub ratings: Vec<NpsRating>,
}

/// Block 3 K1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KpcImportanceAnswers {
    /// Importance 1-5 keyed by KPC attribute code
    pub importance: BTreeMap<String, i64>,
}

/// Block 3 K2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KpcPerformanceAnswers {
    /// Retailer code -> attribute code -> performance 1-5
    pub performance: BTreeMap<String, BTreeMap<String, i64>>,
}

/// Block 4
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SowChangeAnswers {
    pub stores: Vec<SowChangeAnswer>,
}

/// S3: funnel stage for every catalog retailer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunnelAnswers {
    pub funnel: BTreeMap<String, i64>,
    #[serde(default)]
    pub other_text: Option<String>,
}

/// S5a: retailers the respondent moved spend away from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchedStoresAnswers {
    pub stores: Vec<String>,
    #[serde(default)]
    pub other_text: Option<String>,
}

/// Block 2: likelihood to recommend one assigned retailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NpsRating {
    pub retailer: String,
    pub score: i64,
    pub verbatim: String,
}

/// Block 4: past and expected change of spend at one SOW store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SowChangeAnswer {
    pub store: String,
    pub retro: DirectionAnswer,
    pub fwd: DirectionAnswer,
}

/// 1 = increase, 2 = about the same, 3 = decrease. A reason (1-6, 6 = other)
/// is asked only for a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectionAnswer {
    pub dir: i64,
    #[serde(default)]
    pub reason: Option<i64>,
    #[serde(default)]
    pub reason_text: Option<String>,
}

/// Block 5: churn risk (customers) or acquisition trigger (prospects), plus channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoyaltyAnswers {
    #[serde(default)]
    pub churn_risk_reason: Option<i64>,
    #[serde(default)]
    pub churn_risk_reason_text: Option<String>,
    #[serde(default)]
    pub fareway_improve_verbatim: Option<String>,
    #[serde(default)]
    pub acquisition_trigger: Option<i64>,
    #[serde(default)]
    pub acquisition_trigger_text: Option<String>,
    #[serde(default)]
    pub fareway_tryme_verbatim: Option<String>,
    pub channel_current: i64,
    pub channel_change: i64,
}

/// Block 6
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrequencyAnswers {
    pub freq_total: i64,
    /// Customers only
    #[serde(default)]
    pub freq_fareway: Option<i64>,
    pub avg_basket: i64,
    pub trip_trend: i64,
}

/// Block 7
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroAnswers {
    pub budget_trend: i64,
    pub macro_response: i64,
    /// Trade-down option codes (`tradedown_*`)
    pub tradedowns: Vec<String>,
    /// One or two retailers
    pub best_value: Vec<String>,
    /// Ranked, one to three retailers
    pub price_raised: Vec<String>,
    /// Ranked, one to three retailers
    pub price_stable: Vec<String>,
}

/// Block 8: every question may be skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemographicsAnswers {
    #[serde(default)]
    pub gender: Option<i64>,
    #[serde(default)]
    pub education: Option<i64>,
    #[serde(default)]
    pub employment: Option<i64>,
    #[serde(default)]
    pub area_type: Option<i64>,
    #[serde(default)]
    pub distance_fareway: Option<i64>,
    #[serde(default)]
    pub household_size: Option<i64>,
    #[serde(default)]
    pub ethnicity: Option<i64>,
    #[serde(default)]
    pub ethnicity_other_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> serde_json::Result<BlockAnswers> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_tagged_payloads_parse() {
        assert_eq!(parse(json!({"block": "consent"})).unwrap(), BlockAnswers::Consent(ConsentAnswers {}));
        assert_eq!(
            parse(json!({"block": "block1_s1", "zip_code": "50010"})).unwrap(),
            BlockAnswers::Zip(ZipAnswers { zip_code: "50010".to_string() })
        );
        let demo = parse(json!({"block": "block8", "gender": 2})).unwrap();
        assert_eq!(demo.block(), Block::Demographics);
        match demo {
            BlockAnswers::Demographics(d) => {
                assert_eq!(d.gender, Some(2));
                assert_eq!(d.education, None);
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_misspelled_fields_rejected() {
        let err = parse(json!({"block": "block8", "gendr": 2})).unwrap_err();
        assert!(err.to_string().contains("gendr"), "{}", err);

        assert!(parse(json!({"block": "consent", "agree": true})).is_err());
        assert!(parse(json!({"block": "block1_s6", "income_band": 3, "incom_band": 3})).is_err());
        assert!(parse(json!({"block": "block1_s4", "stores": {"fareway": 100}, "other": 0})).is_err());
    }

    #[test]
    fn test_nested_misspelling_rejected() {
        let err = parse(json!({
            "block": "block2",
            "ratings": [{"retailer": "fareway", "score": 9, "verbatim": "ok", "scroe": 9}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("scroe"), "{}", err);

        assert!(parse(json!({
            "block": "block4",
            "stores": [{"store": "fareway", "retro": {"dir": 2, "why": 1}, "fwd": {"dir": 2}}]
        }))
        .is_err());
    }
}
