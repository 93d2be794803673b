//! Static reference data: retailer catalog, KPC attributes, funnel labels,
//! rating scales, quota targets, basket midpoints, termination messages.
//!
//! Pure data, no behavior beyond lookups.

use crate::segment::Segment;

/// Retailer whose customers the survey is built around
pub const TARGET_BRAND: &str = "fareway";

/// Catalog code for the write-in "Other" retailer
pub const OTHER_RETAILER: &str = "other";

/// One row of the retailer catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retailer {
    pub code: &'static str,
    pub display: &'static str,
    pub short_display: &'static str,
}

/// Retailer catalog in questionnaire order ("other" anchored last)
pub const RETAILERS: &[Retailer] = &[
    Retailer { code: "fareway", display: "Fareway", short_display: "Fareway" },
    Retailer { code: "hyvee", display: "Hy-Vee", short_display: "Hy-Vee" },
    Retailer { code: "kroger", display: "Kroger", short_display: "Kroger" },
    Retailer { code: "aldi", display: "Aldi", short_display: "Aldi" },
    Retailer {
        code: "walmart",
        display: "Walmart Grocery / Walmart Supercenter",
        short_display: "Walmart",
    },
    Retailer { code: "costco", display: "Costco", short_display: "Costco" },
    Retailer { code: "meijer", display: "Meijer", short_display: "Meijer" },
    Retailer { code: "target", display: "Target (grocery section)", short_display: "Target" },
    Retailer { code: "wholefoods", display: "Whole Foods Market", short_display: "Whole Foods" },
    Retailer { code: "traderjoes", display: "Trader Joe's", short_display: "Trader Joe's" },
    Retailer { code: "samsclub", display: "Sam's Club", short_display: "Sam's Club" },
    Retailer { code: "pricechopper", display: "Price Chopper", short_display: "Price Chopper" },
    Retailer { code: "schnucks", display: "Schnucks", short_display: "Schnucks" },
    Retailer { code: "savealot", display: "Save-A-Lot", short_display: "Save-A-Lot" },
    Retailer { code: "other", display: "Other (please specify)", short_display: "Other" },
];

/// Look up a retailer by code
pub fn retailer(code: &str) -> Option<&'static Retailer> {
    RETAILERS.iter().find(|r| r.code == code)
}

/// Display name for a code, falling back to the code itself
pub fn retailer_display(code: &str) -> &str {
    retailer(code).map(|r| r.display).unwrap_or(code)
}

/// Position of a retailer in catalog order (unknown codes sort last)
pub fn catalog_position(code: &str) -> usize {
    RETAILERS
        .iter()
        .position(|r| r.code == code)
        .unwrap_or(RETAILERS.len())
}

/// Named retailers, i.e. every catalog entry except the write-in "other"
pub fn named_retailers() -> impl Iterator<Item = &'static Retailer> {
    RETAILERS.iter().filter(|r| r.code != OTHER_RETAILER)
}

/// True when `code` is a named (non write-in) catalog retailer
pub fn is_named_retailer(code: &str) -> bool {
    code != OTHER_RETAILER && retailer(code).is_some()
}

/// Key purchase criterion rated for importance (K1) and performance (K2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KpcAttribute {
    pub code: &'static str,
    pub label: &'static str,
}

pub const KPC_ATTRIBUTES: &[KpcAttribute] = &[
    KpcAttribute { code: "lowest_price", label: "Lowest prices" },
    KpcAttribute { code: "best_value", label: "Best value for money" },
    KpcAttribute { code: "prod_quality", label: "Product quality overall" },
    KpcAttribute { code: "produce_fresh", label: "Freshness of produce" },
    KpcAttribute { code: "meat_seafood", label: "Quality of meat and seafood" },
    KpcAttribute { code: "private_label", label: "Private label / store brand offering" },
    KpcAttribute {
        code: "assortment",
        label: "Breadth of product assortment (selection and variety)",
    },
    KpcAttribute { code: "cleanliness", label: "Store cleanliness and appearance" },
    KpcAttribute { code: "checkout", label: "Checkout speed and convenience" },
    KpcAttribute { code: "location", label: "Store location / proximity to my home" },
    KpcAttribute {
        code: "digital",
        label: "Digital / online shopping experience (delivery, curbside pickup)",
    },
    KpcAttribute { code: "prepared_foods", label: "Prepared foods, deli, and bakery" },
    KpcAttribute {
        code: "price_stability",
        label: "Price stability / consistent pricing over time",
    },
];

/// Funnel stage labels, index 0 = stage 1
pub const FUNNEL_LABELS: [&str; 6] = [
    "Not aware of this store",
    "Aware but never considered shopping there",
    "Considered but never shopped there",
    "Shopped there in the past but not in the last 12 months",
    "Shopped there in the last 12 months but not the last 3 months",
    "Shopped there in the last 3 months",
];

/// Importance scale (K1), index 0 = value 1
pub const IMPORTANCE_SCALE: [&str; 5] = [
    "Not at all important",
    "Slightly important",
    "Moderately important",
    "Very important",
    "Extremely important",
];

/// Performance scale (K2), index 0 = value 1
pub const PERFORMANCE_SCALE: [&str; 5] = [
    "Very poor",
    "Below average",
    "Average",
    "Good",
    "Excellent",
];

/// Fixed quota bounds for one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTarget {
    pub min: i64,
    pub max: i64,
}

/// Default quota table used to seed `segment_quotas`
pub fn default_quota(segment: Segment) -> QuotaTarget {
    match segment {
        Segment::PrimaryShopper => QuotaTarget { min: 2500, max: 3000 },
        Segment::SecondaryShopper => QuotaTarget { min: 1500, max: 2000 },
        Segment::Lapsed => QuotaTarget { min: 800, max: 1000 },
        Segment::AwareNonCustomer => QuotaTarget { min: 1500, max: 2000 },
        Segment::UnawareNonCustomer => QuotaTarget { min: 500, max: 800 },
    }
}

/// Dollar midpoint of an average-basket band (F3)
pub fn basket_midpoint(band: i64) -> Option<f64> {
    match band {
        1 => Some(12.50),
        2 => Some(37.50),
        3 => Some(75.50),
        4 => Some(125.50),
        5 => Some(175.50),
        6 => Some(250.00),
        _ => None,
    }
}

/// Trade-down behaviours offered in M3; the last entry is exclusive
pub const TRADEDOWN_OPTIONS: [&str; 7] = [
    "tradedown_storebrand",
    "tradedown_organic",
    "tradedown_premium",
    "tradedown_discount_grocer",
    "tradedown_coupons",
    "tradedown_food_waste",
    "tradedown_none",
];

pub const TRADEDOWN_NONE: &str = "tradedown_none";

/// Progress fraction shown when resuming at a cursor position
pub fn block_progress(block: &str) -> f64 {
    match block {
        "consent" => 0.0,
        b if b.starts_with("block1") => 0.20,
        "block2" => 0.30,
        b if b.starts_with("block3") => 0.50,
        "block4" => 0.65,
        "block5" => 0.75,
        "block6" => 0.80,
        "block7" => 0.95,
        _ => 1.0,
    }
}

/// Neutral respondent-facing message for a termination reason
pub fn termination_message(reason: &str) -> &'static str {
    match reason {
        "S1" => "Thank you for your interest, but you are not eligible for this survey at this time.",
        "S2" => "Thank you, but we are looking for household grocery decision-makers for this survey.",
        "S3" => "Thank you, but we are looking for active grocery shoppers for this survey.",
        "S7" => "Thank you, but you must be 18 or older to participate in this survey.",
        "quota_full" => {
            "Thank you for your interest, but we have received enough responses in your category. We appreciate your time."
        }
        _ => "Thank you for your time. You may now close this window.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_fifteen_retailers_other_last() {
        assert_eq!(RETAILERS.len(), 15);
        assert_eq!(RETAILERS.last().unwrap().code, OTHER_RETAILER);
        assert_eq!(named_retailers().count(), 14);
    }

    #[test]
    fn test_target_brand_is_named_retailer() {
        assert!(is_named_retailer(TARGET_BRAND));
        assert!(!is_named_retailer(OTHER_RETAILER));
        assert!(!is_named_retailer("piggly_wiggly"));
    }

    #[test]
    fn test_catalog_position_orders_unknown_last() {
        assert_eq!(catalog_position("fareway"), 0);
        assert_eq!(catalog_position("savealot"), 13);
        assert_eq!(catalog_position("nope"), RETAILERS.len());
    }

    #[test]
    fn test_display_falls_back_to_code() {
        assert_eq!(retailer_display("hyvee"), "Hy-Vee");
        assert_eq!(retailer_display("mystery"), "mystery");
    }

    #[test]
    fn test_default_quotas_min_below_max() {
        for segment in Segment::ALL {
            let q = default_quota(segment);
            assert!(q.min < q.max, "{:?}", segment);
        }
        assert_eq!(default_quota(Segment::PrimaryShopper).max, 3000);
    }

    #[test]
    fn test_basket_midpoints() {
        assert_eq!(basket_midpoint(1), Some(12.50));
        assert_eq!(basket_midpoint(6), Some(250.00));
        assert_eq!(basket_midpoint(7), None);
    }

    #[test]
    fn test_block_progress() {
        assert_eq!(block_progress("consent"), 0.0);
        assert_eq!(block_progress("block1_s4a"), 0.20);
        assert_eq!(block_progress("block3_k2"), 0.50);
        assert_eq!(block_progress("complete"), 1.0);
    }

    #[test]
    fn test_termination_message_defaults() {
        assert!(termination_message("quota_full").contains("enough responses"));
        assert_eq!(
            termination_message("S6_PNTS"),
            "Thank you for your time. You may now close this window."
        );
    }
}
