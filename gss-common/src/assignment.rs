//! Retailer assignment engine
//!
//! Chooses up to three retailers (R1..R3) a respondent rates in the NPS and
//! KPC-performance blocks:
//! - R1 is always the respondent's primary (largest share-of-wallet) store.
//! - R2 is the target brand for secondary shoppers who shopped it in the
//!   last 3 months, otherwise the least-filled remaining store.
//! - R3 is the least-filled store left after R2.
//!
//! Fill counters only balance sample sizes. A counter failure costs the
//! respondent a slot, never the submission.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{self, TARGET_BRAND};
use crate::segment::Segment;
use crate::{Error, Result};

/// Store of per-retailer assignment counts
#[async_trait]
pub trait FillLedger: Send + Sync {
    /// Atomically pick the candidate with the lowest count and increment it.
    /// Ties are broken arbitrarily. None when no candidate is known.
    async fn take_least_filled(&self, candidates: &[String]) -> Result<Option<String>>;

    /// Increment one retailer's count
    async fn record_fill(&self, retailer: &str) -> Result<()>;
}

/// Assigned retailers in slot order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerAssignment {
    pub r1: Option<String>,
    pub r2: Option<String>,
    pub r3: Option<String>,
}

impl RetailerAssignment {
    pub fn slots(&self) -> [Option<String>; 3] {
        [self.r1.clone(), self.r2.clone(), self.r3.clone()]
    }

    /// Non-empty slots in order
    pub fn retailers(&self) -> Vec<String> {
        self.slots().into_iter().flatten().collect()
    }
}

/// Assign R1..R3 for one respondent.
///
/// `stores_last_3m` are the retailers the respondent shopped in the last
/// 3 months; the write-in "other" is never assigned. Unknown retailer codes
/// are rejected before any counter is touched.
pub async fn assign_retailers(
    ledger: &dyn FillLedger,
    respondent_id: &str,
    stores_last_3m: &[String],
    primary_store: &str,
    segment: Segment,
) -> Result<RetailerAssignment> {
    if !catalog::is_named_retailer(primary_store) {
        return Err(Error::InvalidInput(format!(
            "Primary store is not an assignable retailer: {}",
            primary_store
        )));
    }
    if let Some(unknown) = stores_last_3m
        .iter()
        .find(|s| s.as_str() != catalog::OTHER_RETAILER && catalog::retailer(s).is_none())
    {
        return Err(Error::InvalidInput(format!("Unknown retailer code: {}", unknown)));
    }

    let r1 = primary_store.to_string();
    if let Err(e) = ledger.record_fill(&r1).await {
        warn!(respondent_id = %respondent_id, retailer = %r1, error = %e, "Fill count increment failed for R1");
    }

    let mut remaining: Vec<String> = Vec::new();
    for store in stores_last_3m {
        if store != &r1 && catalog::is_named_retailer(store) && !remaining.contains(store) {
            remaining.push(store.clone());
        }
    }

    let force_target =
        segment == Segment::SecondaryShopper && remaining.iter().any(|s| s == TARGET_BRAND);

    let r2 = if force_target {
        if let Err(e) = ledger.record_fill(TARGET_BRAND).await {
            warn!(respondent_id = %respondent_id, retailer = TARGET_BRAND, error = %e, "Fill count increment failed for forced R2");
        }
        Some(TARGET_BRAND.to_string())
    } else {
        pick_least_filled(ledger, respondent_id, "R2", &remaining).await
    };

    if let Some(picked) = &r2 {
        remaining.retain(|s| s != picked);
    }
    let r3 = pick_least_filled(ledger, respondent_id, "R3", &remaining).await;

    let assignment = RetailerAssignment {
        r1: Some(r1),
        r2,
        r3,
    };
    debug!(
        respondent_id = %respondent_id,
        segment = %segment,
        r1 = ?assignment.r1,
        r2 = ?assignment.r2,
        r3 = ?assignment.r3,
        "Retailers assigned"
    );
    Ok(assignment)
}

async fn pick_least_filled(
    ledger: &dyn FillLedger,
    respondent_id: &str,
    slot: &str,
    candidates: &[String],
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    match ledger.take_least_filled(candidates).await {
        Ok(Some(picked)) if candidates.contains(&picked) => Some(picked),
        Ok(Some(picked)) => {
            warn!(respondent_id = %respondent_id, slot, retailer = %picked, "Fill ledger returned a non-candidate, slot left empty");
            None
        }
        Ok(None) => {
            warn!(respondent_id = %respondent_id, slot, "No fill counter for any candidate, slot left empty");
            None
        }
        Err(e) => {
            warn!(respondent_id = %respondent_id, slot, error = %e, "Least-fill selection failed, slot left empty");
            None
        }
    }
}
