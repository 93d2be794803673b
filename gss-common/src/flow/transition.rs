//! Pure transition function of the survey flow
//!
//! `next` validates one block's answers against the respondent's durable
//! context and returns the next state plus the fields to persist. It does
//! no I/O: ZIP lookups are resolved by the caller beforehand, and quota
//! admission, retailer assignment and finalization are requested through
//! the returned `Transition`.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::answers::{
    AgeAnswers, BlockAnswers, ConsentAnswers, DecisionMakerAnswers, DemographicsAnswers,
    DirectionAnswer, FrequencyAnswers, FunnelAnswers, HouseholdAnswers, IncomeAnswers,
    KpcImportanceAnswers, KpcPerformanceAnswers, LoyaltyAnswers, MacroAnswers, NpsAnswers,
    NpsRating, SowChangeAnswer, SowChangeAnswers, StoreFrequencyAnswers, SwitchedOutAnswers,
    SwitchedStoresAnswers, ZipAnswers,
};
use super::state::{Block, FlowState, TerminationReason};
use crate::catalog::{self, KPC_ATTRIBUTES, OTHER_RETAILER, RETAILERS, TARGET_BRAND};
use crate::config::is_zip_format;
use crate::db::models::RespondentRecord;
use crate::db::zip_lookup::ZipLookup;
use crate::segment::{
    classify_segment, collapse_age, collapse_channel, collapse_household, collapse_income,
    nps_category, FunnelStage, Segment,
};
use crate::sow::{rank_allocation, validate_allocation, SowAllocation, SowEntry, RANKED_STORES};
use crate::{Error, Result};

/// Durable facts earlier blocks established that later blocks depend on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowContext {
    pub segment: Option<Segment>,
    /// Funnel stage per retailer code from S3
    pub funnel: BTreeMap<String, i64>,
    /// Named retailers at funnel stage 6
    pub stores_last_3m: Vec<String>,
    /// Ranked share-of-wallet stores (at most three)
    pub sow_stores: Vec<SowEntry>,
    /// Assignment slots R1..R3
    pub assigned: [Option<String>; 3],
    /// Trade-area lookup for the submitted ZIP, supplied when answering S1
    pub zip: Option<ZipLookup>,
}

impl FlowContext {
    pub fn from_record(record: &RespondentRecord) -> Self {
        let funnel = RETAILERS
            .iter()
            .filter_map(|r| {
                record
                    .answer_i64(&format!("funnel_{}", r.code))
                    .map(|stage| (r.code.to_string(), stage))
            })
            .collect();

        let stores_last_3m = record
            .answer("stores_last_3m")
            .and_then(Value::as_array)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let sow_stores = (1..=RANKED_STORES)
            .filter_map(|i| {
                let code = record.answer_str(&format!("sow_store{}_name", i))?;
                let pct = record.answer_i64(&format!("sow_store{}_pct", i)).unwrap_or(0);
                Some(SowEntry {
                    code: code.to_string(),
                    pct,
                })
            })
            .collect();

        Self {
            segment: record.segment,
            funnel,
            stores_last_3m,
            sow_stores,
            assigned: [
                record.nps_r1_store.clone(),
                record.nps_r2_store.clone(),
                record.nps_r3_store.clone(),
            ],
            zip: None,
        }
    }

    pub fn with_zip(mut self, zip: ZipLookup) -> Self {
        self.zip = Some(zip);
        self
    }

    /// Filled assignment slots as (slot number, retailer)
    fn assigned_slots(&self) -> Vec<(usize, &str)> {
        self.assigned
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_deref().map(|code| (i + 1, code)))
            .collect()
    }

    /// Named retailers the respondent is at least aware of (stage >= 2)
    fn aware_retailers(&self) -> BTreeSet<&str> {
        self.funnel
            .iter()
            .filter(|(code, stage)| **stage >= 2 && catalog::is_named_retailer(code))
            .map(|(code, _)| code.as_str())
            .collect()
    }

    fn require_segment(&self) -> Result<Segment> {
        self.segment
            .ok_or_else(|| Error::InvalidState("Respondent has not been classified".to_string()))
    }
}

/// Outcome of one accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: FlowState,
    /// Answer fields to merge into the record (null clears a field)
    pub updates: Map<String, Value>,
    /// Segment derived by this block (S4 only)
    pub segment: Option<Segment>,
    /// Primary store derived by this block (S4 only)
    pub primary_store: Option<String>,
    /// Quota admission and retailer assignment must run before `next` holds
    pub requires_admission: bool,
}

impl Transition {
    fn to(next: FlowState, updates: Map<String, Value>) -> Self {
        Self {
            next,
            updates,
            segment: None,
            primary_store: None,
            requires_admission: false,
        }
    }

    fn advance(block: Block, updates: Map<String, Value>) -> Self {
        Self::to(FlowState::At(block), updates)
    }

    fn terminate(reason: TerminationReason, updates: Map<String, Value>) -> Self {
        Self::to(FlowState::Terminated(reason), updates)
    }
}

/// Validate `answers` for the current state and compute the next one.
///
/// Answers for any block other than the current one are `InvalidState`;
/// malformed answers are `InvalidInput` and nothing is applied.
pub fn next(state: FlowState, ctx: &FlowContext, answers: &BlockAnswers) -> Result<Transition> {
    let current = match state {
        FlowState::At(block) => block,
        terminal => {
            return Err(Error::InvalidState(format!(
                "Survey already {}",
                terminal.cursor()
            )))
        }
    };
    if answers.block() != current {
        return Err(Error::InvalidState(format!(
            "Expected answers for {}, got {}",
            current,
            answers.block()
        )));
    }

    match answers {
        BlockAnswers::Consent(ConsentAnswers {}) => Ok(Transition::advance(Block::S1Zip, Map::new())),
        BlockAnswers::Zip(ZipAnswers { zip_code }) => zip(ctx, zip_code),
        BlockAnswers::DecisionMaker(DecisionMakerAnswers {
            grocery_decisionmaker,
        }) => decision_maker(*grocery_decisionmaker),
        BlockAnswers::Funnel(a) => funnel(a),
        BlockAnswers::ShareOfWallet(a) => share_of_wallet(ctx, a),
        BlockAnswers::StoreFrequency(StoreFrequencyAnswers { frequency }) => store_frequency(ctx, frequency),
        BlockAnswers::SwitchedOut(SwitchedOutAnswers { switched_out_any }) => switched_out(*switched_out_any),
        BlockAnswers::SwitchedStores(a) => switched_stores(a),
        BlockAnswers::Income(IncomeAnswers { income_band }) => income(*income_band),
        BlockAnswers::Age(AgeAnswers { age_cohort }) => age(*age_cohort),
        BlockAnswers::Household(HouseholdAnswers { household_type }) => household(ctx, *household_type),
        BlockAnswers::Nps(NpsAnswers { ratings }) => nps(ctx, ratings),
        BlockAnswers::KpcImportance(KpcImportanceAnswers { importance }) => kpc_importance(importance),
        BlockAnswers::KpcPerformance(KpcPerformanceAnswers { performance }) => kpc_performance(ctx, performance),
        BlockAnswers::SowChange(SowChangeAnswers { stores }) => sow_change(ctx, stores),
        BlockAnswers::Loyalty(a) => loyalty(ctx, a),
        BlockAnswers::Frequency(a) => frequency(ctx, a),
        BlockAnswers::Macro(a) => macro_block(ctx, a),
        BlockAnswers::Demographics(a) => demographics(a),
    }
}

fn zip(ctx: &FlowContext, zip_code: &str) -> Result<Transition> {
    let zip_code = zip_code.trim();
    if !is_zip_format(zip_code) {
        return Err(Error::InvalidInput(format!(
            "ZIP code must be 5 digits: {:?}",
            zip_code
        )));
    }
    let lookup = ctx
        .zip
        .as_ref()
        .ok_or_else(|| Error::Internal("ZIP lookup result not supplied".to_string()))?;

    let mut updates = Map::new();
    put(&mut updates, "zip_code", zip_code);
    if !lookup.valid {
        return Ok(Transition::terminate(
            TerminationReason::OutsideTradeArea,
            updates,
        ));
    }
    put(&mut updates, "dma", lookup.dma.clone());
    put(&mut updates, "zip_state", lookup.state.clone());
    Ok(Transition::advance(Block::S2DecisionMaker, updates))
}

fn decision_maker(value: i64) -> Result<Transition> {
    let value = in_range("grocery_decisionmaker", value, 1, 3)?;
    let mut updates = Map::new();
    put(&mut updates, "grocery_decisionmaker", value);
    if value == 3 {
        return Ok(Transition::terminate(
            TerminationReason::NotDecisionMaker,
            updates,
        ));
    }
    Ok(Transition::advance(Block::S3Funnel, updates))
}

fn funnel(answers: &FunnelAnswers) -> Result<Transition> {
    let expected: Vec<String> = RETAILERS.iter().map(|r| r.code.to_string()).collect();
    expect_exact_keys("funnel", answers.funnel.keys(), &expected)?;

    let mut updates = Map::new();
    for retailer in RETAILERS {
        let stage = answers.funnel[retailer.code];
        FunnelStage::try_from(stage)
            .map_err(|_| Error::InvalidInput(format!("funnel_{} must be 1-6", retailer.code)))?;
        put(&mut updates, &format!("funnel_{}", retailer.code), stage);
    }

    let other_stage = answers.funnel[OTHER_RETAILER];
    let other_text = if other_stage >= 2 {
        Some(text_min(
            "funnel_other_text",
            answers.other_text.as_deref(),
            2,
        )?)
    } else {
        trimmed(answers.other_text.as_deref())
    };
    put(&mut updates, "funnel_other_text", other_text);

    if !answers.funnel.values().any(|stage| *stage >= 5) {
        return Ok(Transition::terminate(
            TerminationReason::NoRecentShopping,
            updates,
        ));
    }

    let stores_last_3m: Vec<Value> = catalog::named_retailers()
        .filter(|r| answers.funnel[r.code] == 6)
        .map(|r| Value::from(r.code))
        .collect();
    put(&mut updates, "stores_last_3m", stores_last_3m);

    Ok(Transition::advance(Block::S4ShareOfWallet, updates))
}

fn share_of_wallet(ctx: &FlowContext, allocation: &SowAllocation) -> Result<Transition> {
    validate_allocation(&ctx.stores_last_3m, allocation)?;

    let target_stage = ctx.funnel.get(TARGET_BRAND).copied().ok_or_else(|| {
        Error::InvalidState("Funnel answers missing for share of wallet".to_string())
    })?;
    let target_stage = FunnelStage::try_from(target_stage)?;

    let ranking = rank_allocation(allocation);
    let primary_store = ranking.primary_store().map(str::to_string);
    let segment = classify_segment(target_stage, primary_store.as_deref());

    let mut updates = Map::new();
    for i in 0..RANKED_STORES {
        let entry = ranking.top().get(i);
        put(
            &mut updates,
            &format!("sow_store{}_name", i + 1),
            entry.map(|e| e.code.clone()),
        );
        put(
            &mut updates,
            &format!("sow_store{}_pct", i + 1),
            entry.map(|e| e.pct).unwrap_or(0),
        );
    }
    put(&mut updates, "sow_other_pct", ranking.other_pct);
    put(&mut updates, "qc_sow_tie", ranking.tie as i64);

    let mut transition = Transition::advance(Block::S4aStoreFrequency, updates);
    transition.segment = Some(segment);
    transition.primary_store = primary_store;
    Ok(transition)
}

fn store_frequency(ctx: &FlowContext, frequency: &BTreeMap<String, i64>) -> Result<Transition> {
    let expected: Vec<String> = ctx.sow_stores.iter().map(|e| e.code.clone()).collect();
    expect_exact_keys("frequency", frequency.keys(), &expected)?;

    let mut updates = Map::new();
    for (i, entry) in ctx.sow_stores.iter().enumerate() {
        let value = in_range(
            &format!("frequency for {}", entry.code),
            frequency[&entry.code],
            1,
            4,
        )?;
        put(&mut updates, &format!("freq_store{}", i + 1), value);
    }
    Ok(Transition::advance(Block::S5SwitchedOut, updates))
}

fn switched_out(value: i64) -> Result<Transition> {
    let value = in_range("switched_out_any", value, 0, 1)?;
    let mut updates = Map::new();
    put(&mut updates, "switched_out_any", value);
    let next = if value == 1 {
        Block::S5aSwitchedStores
    } else {
        Block::S6Income
    };
    Ok(Transition::advance(next, updates))
}

fn switched_stores(answers: &SwitchedStoresAnswers) -> Result<Transition> {
    if answers.stores.is_empty() {
        return Err(Error::InvalidInput(
            "Select at least one store".to_string(),
        ));
    }
    distinct_known_retailers("stores", &answers.stores, |code| {
        catalog::retailer(code).is_some()
    })?;

    let mut updates = Map::new();
    for retailer in RETAILERS {
        let selected = answers.stores.iter().any(|s| s == retailer.code);
        put(
            &mut updates,
            &format!("switched_out_{}", retailer.code),
            selected as i64,
        );
    }
    let other_text = if answers.stores.iter().any(|s| s == OTHER_RETAILER) {
        Some(text_min(
            "switched_out_other_text",
            answers.other_text.as_deref(),
            2,
        )?)
    } else {
        None
    };
    put(&mut updates, "switched_out_other_text", other_text);

    Ok(Transition::advance(Block::S6Income, updates))
}

fn income(value: i64) -> Result<Transition> {
    let value = in_range("income_band", value, 1, 7)?;
    let mut updates = Map::new();
    put(&mut updates, "income_band", value);
    if value == 7 {
        return Ok(Transition::terminate(
            TerminationReason::IncomeRefused,
            updates,
        ));
    }
    put(&mut updates, "income_band_collapsed", collapse_income(value));
    Ok(Transition::advance(Block::S7Age, updates))
}

fn age(value: i64) -> Result<Transition> {
    let value = in_range("age_cohort", value, 1, 8)?;
    let mut updates = Map::new();
    put(&mut updates, "age_cohort", value);
    match value {
        1 => Ok(Transition::terminate(TerminationReason::Underage, updates)),
        8 => Ok(Transition::terminate(TerminationReason::AgeRefused, updates)),
        _ => {
            put(&mut updates, "age_cohort_collapsed", collapse_age(value));
            Ok(Transition::advance(Block::S8Household, updates))
        }
    }
}

fn household(ctx: &FlowContext, value: i64) -> Result<Transition> {
    ctx.require_segment()?;
    let value = in_range("household_type", value, 1, 6)?;
    let mut updates = Map::new();
    put(&mut updates, "household_type", value);
    put(
        &mut updates,
        "household_type_collapsed",
        collapse_household(value),
    );

    let mut transition = Transition::advance(Block::Nps, updates);
    transition.requires_admission = true;
    Ok(transition)
}

fn nps(ctx: &FlowContext, ratings: &[NpsRating]) -> Result<Transition> {
    let slots = ctx.assigned_slots();
    let expected: Vec<String> = slots.iter().map(|(_, code)| code.to_string()).collect();
    let given: Vec<String> = ratings.iter().map(|r| r.retailer.clone()).collect();
    if given.len() != expected.len() {
        return Err(Error::InvalidInput(format!(
            "Expected ratings for {:?}",
            expected
        )));
    }
    expect_exact_keys("ratings", given.iter(), &expected)?;

    let mut updates = Map::new();
    for (slot, code) in slots {
        let rating = ratings
            .iter()
            .find(|r| r.retailer == code)
            .ok_or_else(|| Error::InvalidInput(format!("Missing rating for {}", code)))?;
        let score = in_range(&format!("score for {}", code), rating.score, 0, 10)?;
        let verbatim = text_min(
            &format!("reason for {}", code),
            Some(rating.verbatim.as_str()),
            5,
        )?;
        put(&mut updates, &format!("nps_r{}_score", slot), score);
        put(
            &mut updates,
            &format!("nps_r{}_category", slot),
            nps_category(score),
        );
        put(&mut updates, &format!("nps_r{}_verbatim", slot), verbatim);
    }
    Ok(Transition::advance(Block::KpcImportance, updates))
}

fn kpc_importance(importance: &BTreeMap<String, i64>) -> Result<Transition> {
    let mut updates = Map::new();
    rate_attributes("importance", importance, "k1_imp_", &mut updates)?;
    Ok(Transition::advance(Block::KpcPerformance, updates))
}

fn kpc_performance(
    ctx: &FlowContext,
    performance: &BTreeMap<String, BTreeMap<String, i64>>,
) -> Result<Transition> {
    let slots = ctx.assigned_slots();
    let expected: Vec<String> = slots.iter().map(|(_, code)| code.to_string()).collect();
    expect_exact_keys("performance", performance.keys(), &expected)?;

    let mut updates = Map::new();
    for (slot, code) in slots {
        rate_attributes(
            &format!("performance for {}", code),
            &performance[code],
            &format!("k2_perf_r{}_", slot),
            &mut updates,
        )?;
    }
    Ok(Transition::advance(Block::SowChange, updates))
}

fn sow_change(ctx: &FlowContext, stores: &[SowChangeAnswer]) -> Result<Transition> {
    let shown: Vec<&SowEntry> = ctx
        .sow_stores
        .iter()
        .filter(|e| e.pct > 0)
        .take(RANKED_STORES)
        .collect();
    let expected: Vec<String> = shown.iter().map(|e| e.code.clone()).collect();
    let given: Vec<String> = stores.iter().map(|s| s.store.clone()).collect();
    if given.len() != expected.len() {
        return Err(Error::InvalidInput(format!(
            "Expected answers for {:?}",
            expected
        )));
    }
    expect_exact_keys("stores", given.iter(), &expected)?;

    let mut updates = Map::new();
    for (i, entry) in shown.iter().enumerate() {
        let answer = stores
            .iter()
            .find(|s| s.store == entry.code)
            .ok_or_else(|| Error::InvalidInput(format!("Missing answers for {}", entry.code)))?;
        let n = i + 1;
        direction(&format!("sow_retro_store{}", n), &answer.retro, &mut updates)?;
        direction(&format!("sow_fwd_store{}", n), &answer.fwd, &mut updates)?;
    }
    Ok(Transition::advance(Block::Loyalty, updates))
}

/// Direction 1/3 requires a reason 1-6 (6 needs text); 2 takes none
fn direction(prefix: &str, answer: &DirectionAnswer, updates: &mut Map<String, Value>) -> Result<()> {
    let dir = in_range(&format!("{}_dir", prefix), answer.dir, 1, 3)?;
    put(updates, &format!("{}_dir", prefix), dir);

    let (reason, text) = if dir == 2 {
        if answer.reason.is_some() {
            return Err(Error::InvalidInput(format!(
                "{}: no reason expected when unchanged",
                prefix
            )));
        }
        (None, None)
    } else {
        let reason = answer
            .reason
            .ok_or_else(|| Error::InvalidInput(format!("{}: reason required", prefix)))?;
        let reason = in_range(&format!("{}_reason", prefix), reason, 1, 6)?;
        let text = if reason == 6 {
            Some(text_min(
                &format!("{}_reason_text", prefix),
                answer.reason_text.as_deref(),
                3,
            )?)
        } else {
            None
        };
        (Some(reason), text)
    };

    let (inc, dec) = match dir {
        1 => ((reason, text), (None, None)),
        3 => ((None, None), (reason, text)),
        _ => ((None, None), (None, None)),
    };
    put(updates, &format!("{}_reason_inc", prefix), inc.0);
    put(updates, &format!("{}_reason_inc_text", prefix), inc.1);
    put(updates, &format!("{}_reason_dec", prefix), dec.0);
    put(updates, &format!("{}_reason_dec_text", prefix), dec.1);
    Ok(())
}

fn loyalty(ctx: &FlowContext, a: &LoyaltyAnswers) -> Result<Transition> {
    let segment = ctx.require_segment()?;
    let mut updates = Map::new();

    let churn_given = a.churn_risk_reason.is_some() || a.fareway_improve_verbatim.is_some();
    let acquisition_given = a.acquisition_trigger.is_some() || a.fareway_tryme_verbatim.is_some();

    if segment.is_customer() {
        if acquisition_given {
            return Err(Error::InvalidInput(
                "Acquisition questions are not asked of customers".to_string(),
            ));
        }
        let (reason, text) = coded_reason(
            "churn_risk_reason",
            a.churn_risk_reason,
            a.churn_risk_reason_text.as_deref(),
        )?;
        put(&mut updates, "churn_risk_reason", reason);
        put(&mut updates, "churn_risk_reason_text", text);
        put(
            &mut updates,
            "fareway_improve_verbatim",
            text_min(
                "fareway_improve_verbatim",
                a.fareway_improve_verbatim.as_deref(),
                5,
            )?,
        );
    } else if segment.is_prospect() {
        if churn_given {
            return Err(Error::InvalidInput(
                "Churn-risk questions are only asked of customers".to_string(),
            ));
        }
        let (trigger, text) = coded_reason(
            "acquisition_trigger",
            a.acquisition_trigger,
            a.acquisition_trigger_text.as_deref(),
        )?;
        put(&mut updates, "acquisition_trigger", trigger);
        put(&mut updates, "acquisition_trigger_text", text);
        put(
            &mut updates,
            "fareway_tryme_verbatim",
            text_min(
                "fareway_tryme_verbatim",
                a.fareway_tryme_verbatim.as_deref(),
                5,
            )?,
        );
    } else if churn_given || acquisition_given {
        return Err(Error::InvalidInput(
            "Loyalty questions are not asked of this segment".to_string(),
        ));
    }

    let channel = in_range("channel_current", a.channel_current, 1, 5)?;
    put(&mut updates, "channel_current", channel);
    put(&mut updates, "channel_current_collapsed", collapse_channel(channel));
    put(
        &mut updates,
        "channel_change",
        in_range("channel_change", a.channel_change, 1, 3)?,
    );

    Ok(Transition::advance(Block::Frequency, updates))
}

/// 1-7 coded reason where 7 ("other") needs at least 3 characters of text
fn coded_reason(field: &str, code: Option<i64>, text: Option<&str>) -> Result<(i64, Option<String>)> {
    let code = code.ok_or_else(|| Error::InvalidInput(format!("{} required", field)))?;
    let code = in_range(field, code, 1, 7)?;
    let text = if code == 7 {
        Some(text_min(&format!("{}_text", field), text, 3)?)
    } else {
        None
    };
    Ok((code, text))
}

fn frequency(ctx: &FlowContext, a: &FrequencyAnswers) -> Result<Transition> {
    let segment = ctx.require_segment()?;
    let mut updates = Map::new();

    put(
        &mut updates,
        "freq_total",
        in_range("freq_total", a.freq_total, 1, 5)?,
    );

    let freq_fareway = match (segment.is_customer(), a.freq_fareway) {
        (true, Some(v)) => Some(in_range("freq_fareway", v, 1, 4)?),
        (true, None) => {
            return Err(Error::InvalidInput("freq_fareway required".to_string()));
        }
        (false, Some(_)) => {
            return Err(Error::InvalidInput(
                "freq_fareway is only asked of customers".to_string(),
            ));
        }
        (false, None) => None,
    };
    put(&mut updates, "freq_fareway", freq_fareway);

    let basket = in_range("avg_basket", a.avg_basket, 1, 6)?;
    put(&mut updates, "avg_basket", basket);
    put(
        &mut updates,
        "avg_basket_midpoint",
        catalog::basket_midpoint(basket),
    );
    put(
        &mut updates,
        "trip_trend",
        in_range("trip_trend", a.trip_trend, 1, 3)?,
    );

    Ok(Transition::advance(Block::Macro, updates))
}

fn macro_block(ctx: &FlowContext, a: &MacroAnswers) -> Result<Transition> {
    let mut updates = Map::new();
    put(
        &mut updates,
        "budget_trend",
        in_range("budget_trend", a.budget_trend, 1, 4)?,
    );
    put(
        &mut updates,
        "macro_response",
        in_range("macro_response", a.macro_response, 1, 3)?,
    );

    if a.tradedowns.is_empty() {
        return Err(Error::InvalidInput(
            "Select at least one trade-down option".to_string(),
        ));
    }
    distinct_known_retailers("tradedowns", &a.tradedowns, |code| {
        catalog::TRADEDOWN_OPTIONS.contains(&code)
    })?;
    let none_selected = a.tradedowns.iter().any(|t| t == catalog::TRADEDOWN_NONE);
    if none_selected && a.tradedowns.len() > 1 {
        return Err(Error::InvalidInput(
            "\"None of these\" cannot be combined with other options".to_string(),
        ));
    }
    for option in catalog::TRADEDOWN_OPTIONS {
        let selected = a.tradedowns.iter().any(|t| t == option);
        put(&mut updates, option, selected as i64);
    }
    let count = if none_selected { 0 } else { a.tradedowns.len() };
    put(&mut updates, "tradedown_count", count as i64);

    let eligible = ctx.aware_retailers();
    ranked_picks(&mut updates, "best_value", &a.best_value, 2, &eligible)?;
    ranked_picks(
        &mut updates,
        "price_raised_rank",
        &a.price_raised,
        3,
        &eligible,
    )?;
    ranked_picks(
        &mut updates,
        "price_stable_rank",
        &a.price_stable,
        3,
        &eligible,
    )?;

    Ok(Transition::advance(Block::Demographics, updates))
}

/// 1..=max distinct retailers from `eligible`, stored as `<prefix>_1..max`
fn ranked_picks(
    updates: &mut Map<String, Value>,
    prefix: &str,
    picks: &[String],
    max: usize,
    eligible: &BTreeSet<&str>,
) -> Result<()> {
    if picks.is_empty() || picks.len() > max {
        return Err(Error::InvalidInput(format!(
            "{}: select between 1 and {} stores",
            prefix, max
        )));
    }
    distinct_known_retailers(prefix, picks, |code| eligible.contains(code))?;
    for i in 0..max {
        put(
            updates,
            &format!("{}_{}", prefix, i + 1),
            picks.get(i).cloned(),
        );
    }
    Ok(())
}

fn demographics(a: &DemographicsAnswers) -> Result<Transition> {
    let mut updates = Map::new();
    for (field, value, max) in [
        ("gender", a.gender, 4),
        ("education", a.education, 6),
        ("employment", a.employment, 8),
        ("area_type", a.area_type, 3),
        ("distance_fareway", a.distance_fareway, 5),
        ("household_size", a.household_size, 5),
        ("ethnicity", a.ethnicity, 7),
    ] {
        let value = value.map(|v| in_range(field, v, 1, max)).transpose()?;
        put(&mut updates, field, value);
    }
    let other_text = if a.ethnicity == Some(6) {
        trimmed(a.ethnicity_other_text.as_deref())
    } else {
        None
    };
    put(&mut updates, "ethnicity_other_text", other_text);

    Ok(Transition::to(FlowState::Complete, updates))
}

fn rate_attributes(
    field: &str,
    ratings: &BTreeMap<String, i64>,
    key_prefix: &str,
    updates: &mut Map<String, Value>,
) -> Result<()> {
    let expected: Vec<String> = KPC_ATTRIBUTES.iter().map(|a| a.code.to_string()).collect();
    expect_exact_keys(field, ratings.keys(), &expected)?;
    for attr in KPC_ATTRIBUTES {
        let value = in_range(
            &format!("{} {}", field, attr.code),
            ratings[attr.code],
            1,
            5,
        )?;
        put(updates, &format!("{}{}", key_prefix, attr.code), value);
    }
    Ok(())
}

fn put(updates: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    updates.insert(key.to_string(), value.into());
}

fn in_range(field: &str, value: i64, min: i64, max: i64) -> Result<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be {}-{}, got {}",
            field, min, max, value
        )))
    }
}

fn trimmed(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Trimmed text of at least `min` characters
fn text_min(field: &str, text: Option<&str>, min: usize) -> Result<String> {
    match trimmed(text) {
        Some(t) if t.chars().count() >= min => Ok(t),
        _ => Err(Error::InvalidInput(format!(
            "{} needs at least {} characters",
            field, min
        ))),
    }
}

fn expect_exact_keys<'a>(
    field: &str,
    given: impl Iterator<Item = &'a String>,
    expected: &[String],
) -> Result<()> {
    let given: BTreeSet<&str> = given.map(String::as_str).collect();
    let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    if given != expected {
        let missing: Vec<&&str> = expected.difference(&given).collect();
        let unexpected: Vec<&&str> = given.difference(&expected).collect();
        return Err(Error::InvalidInput(format!(
            "{}: missing {:?}, unexpected {:?}",
            field, missing, unexpected
        )));
    }
    Ok(())
}

fn distinct_known_retailers(
    field: &str,
    codes: &[String],
    allowed: impl Fn(&str) -> bool,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for code in codes {
        if !allowed(code.as_str()) {
            return Err(Error::InvalidInput(format!(
                "{}: {} is not an option",
                field, code
            )));
        }
        if !seen.insert(code.as_str()) {
            return Err(Error::InvalidInput(format!(
                "{}: {} selected twice",
                field, code
            )));
        }
    }
    Ok(())
}
