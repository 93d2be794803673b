//! Share-of-wallet allocation
//!
//! S4 asks respondents to split their grocery spend across the stores they
//! shopped in the last 3 months plus an "all other stores" bucket. The split
//! must total exactly 100.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog;
use crate::{Error, Result};

/// Required allocation total
pub const SOW_TOTAL: i64 = 100;

/// Number of ranked stores carried on the record (sow_store1..3)
pub const RANKED_STORES: usize = 3;

/// Raw S4 answer: percentage per store code plus the "all other" bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SowAllocation {
    #[serde(default)]
    pub stores: BTreeMap<String, i64>,
    #[serde(default)]
    pub other_pct: i64,
}

impl SowAllocation {
    pub fn total(&self) -> i64 {
        self.stores.values().sum::<i64>() + self.other_pct
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SowEntry {
    pub code: String,
    pub pct: i64,
}

/// Stores ordered by share of wallet, largest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SowRanking {
    pub stores: Vec<SowEntry>,
    pub other_pct: i64,
    /// Top two stores have the same percentage
    pub tie: bool,
}

impl SowRanking {
    /// Largest share-of-wallet store, if any store received a share
    pub fn primary_store(&self) -> Option<&str> {
        self.stores.first().map(|e| e.code.as_str())
    }

    /// The ranked stores carried on the record (at most three)
    pub fn top(&self) -> &[SowEntry] {
        &self.stores[..self.stores.len().min(RANKED_STORES)]
    }
}

/// Check an allocation against the stores the respondent was shown.
///
/// Every allocated store must be in `eligible`, every percentage must lie in
/// 0..=100 and the total (stores plus other) must be exactly 100.
pub fn validate_allocation(eligible: &[String], allocation: &SowAllocation) -> Result<()> {
    for (code, pct) in &allocation.stores {
        if !eligible.iter().any(|e| e == code) {
            return Err(Error::InvalidInput(format!(
                "Store {} was not shopped in the last 3 months",
                code
            )));
        }
        if !(0..=SOW_TOTAL).contains(pct) {
            return Err(Error::InvalidInput(format!(
                "Allocation for {} must be 0-100, got {}",
                code, pct
            )));
        }
    }
    if !(0..=SOW_TOTAL).contains(&allocation.other_pct) {
        return Err(Error::InvalidInput(format!(
            "Allocation for other stores must be 0-100, got {}",
            allocation.other_pct
        )));
    }

    let total = allocation.total();
    if total != SOW_TOTAL {
        return Err(Error::InvalidInput(format!(
            "Allocations must sum to exactly 100, got {}",
            total
        )));
    }
    Ok(())
}

/// Rank stores with a non-zero share, percentage descending.
///
/// Equal percentages fall back to catalog order so the same answers always
/// produce the same primary store.
pub fn rank_allocation(allocation: &SowAllocation) -> SowRanking {
    let mut stores: Vec<SowEntry> = allocation
        .stores
        .iter()
        .filter(|(code, pct)| **pct > 0 && code.as_str() != catalog::OTHER_RETAILER)
        .map(|(code, pct)| SowEntry {
            code: code.clone(),
            pct: *pct,
        })
        .collect();

    stores.sort_by(|a, b| {
        b.pct
            .cmp(&a.pct)
            .then_with(|| catalog::catalog_position(&a.code).cmp(&catalog::catalog_position(&b.code)))
    });

    let tie = stores.len() >= 2 && stores[0].pct == stores[1].pct;

    SowRanking {
        stores,
        other_pct: allocation.other_pct,
        tie,
    }
}
