//! Data-quality flags computed once when a respondent completes
//!
//! Flags are advisory. They are stored alongside the answers for review and
//! never change segment, assignment or any persisted answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::KPC_ATTRIBUTES;
use crate::db::models::RespondentRecord;

/// Completions faster than this many seconds are flagged as speeders
pub const SPEEDER_THRESHOLD_SECONDS: i64 = 180;

/// Open-ends shorter than this are never flagged
const GIBBERISH_MIN_LEN: usize = 5;

static WORD_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]{3,}").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub qc_speeder: bool,
    pub qc_straightliner_k1: bool,
    pub qc_straightliner_k2: bool,
    pub qc_gibberish_nps: bool,
    pub qc_gibberish_l1a: bool,
    pub qc_gibberish_l2a: bool,
}

impl QualityFlags {
    /// Flags as 0/1 answer fields ready to merge into the record
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (key, set) in [
            ("qc_speeder", self.qc_speeder),
            ("qc_straightliner_k1", self.qc_straightliner_k1),
            ("qc_straightliner_k2", self.qc_straightliner_k2),
            ("qc_gibberish_nps", self.qc_gibberish_nps),
            ("qc_gibberish_l1a", self.qc_gibberish_l1a),
            ("qc_gibberish_l2a", self.qc_gibberish_l2a),
        ] {
            fields.insert(key.to_string(), Value::from(set as i64));
        }
        fields
    }
}

/// Compute all flags from a finished record.
///
/// Reads `duration_seconds` from the record, so callers finalizing a
/// respondent set the duration first.
pub fn compute_quality_flags(record: &RespondentRecord) -> QualityFlags {
    let k1: Vec<Option<i64>> = KPC_ATTRIBUTES
        .iter()
        .map(|a| record.answer_i64(&format!("k1_imp_{}", a.code)))
        .collect();

    let k2_any = (1..=3).any(|slot| {
        let ratings: Vec<Option<i64>> = KPC_ATTRIBUTES
            .iter()
            .map(|a| record.answer_i64(&format!("k2_perf_r{}_{}", slot, a.code)))
            .collect();
        all_identical(&ratings)
    });

    QualityFlags {
        qc_speeder: record
            .duration_seconds
            .is_some_and(|d| d < SPEEDER_THRESHOLD_SECONDS),
        qc_straightliner_k1: all_identical(&k1),
        qc_straightliner_k2: k2_any,
        qc_gibberish_nps: (1..=3)
            .any(|slot| is_gibberish(record.answer_str(&format!("nps_r{}_verbatim", slot)))),
        qc_gibberish_l1a: is_gibberish(record.answer_str("fareway_improve_verbatim")),
        qc_gibberish_l2a: is_gibberish(record.answer_str("fareway_tryme_verbatim")),
    }
}

/// At least two answered values, all equal. Unanswered entries are ignored.
pub fn all_identical(values: &[Option<i64>]) -> bool {
    let answered: Vec<i64> = values.iter().flatten().copied().collect();
    answered.len() >= 2 && answered.iter().all(|v| *v == answered[0])
}

/// Heuristic "not real text" check for open-ended answers
pub fn is_gibberish(text: Option<&str>) -> bool {
    let text = match text {
        Some(t) if t.chars().count() >= GIBBERISH_MIN_LEN => t,
        _ => return false,
    };

    let letters: String = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    !WORD_RUN.is_match(text)
        || has_char_run(text, 5)
        || (letters.len() >= GIBBERISH_MIN_LEN && !letters.contains(['a', 'e', 'i', 'o', 'u']))
        || is_short_cycle(&letters)
}

/// Any character repeated `run` or more times in a row
fn has_char_run(text: &str, run: usize) -> bool {
    let mut prev = None;
    let mut count = 0;
    for c in text.chars() {
        if Some(c) == prev {
            count += 1;
        } else {
            prev = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

/// Letters made of a 1-3 letter chunk repeated at least three times
/// ("asdasdasd", "hahaha")
fn is_short_cycle(letters: &str) -> bool {
    let bytes = letters.as_bytes();
    if bytes.len() < GIBBERISH_MIN_LEN {
        return false;
    }
    (1..=3).any(|period| {
        bytes.len() >= period * 3 && (period..bytes.len()).all(|i| bytes[i] == bytes[i - period])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RespondentRecord;
    use serde_json::json;

    fn record_with(duration: Option<i64>, answers: Value) -> RespondentRecord {
        let mut record = RespondentRecord::new("qc-test", "direct", 1, None, crate::time::now());
        record.duration_seconds = duration;
        if let Value::Object(map) = answers {
            record.answers = map;
        }
        record
    }

    #[test]
    fn test_gibberish_examples() {
        assert!(is_gibberish(Some("asdasdasd")));
        assert!(!is_gibberish(Some("The produce is fresh")));
        assert!(!is_gibberish(Some("")));
        assert!(!is_gibberish(Some("zzz")));
        assert!(!is_gibberish(None));
    }

    #[test]
    fn test_gibberish_rules() {
        // No run of 3 letters
        assert!(is_gibberish(Some("12 34 56")));
        // Character repeated 5 times
        assert!(is_gibberish(Some("goooood prices")));
        // Only consonants
        assert!(is_gibberish(Some("xkcd qwrt")));
        // Ordinary feedback
        assert!(!is_gibberish(Some("Lower prices on meat")));
        assert!(!is_gibberish(Some("good")));
    }

    #[test]
    fn test_repeated_chunks() {
        assert!(is_gibberish(Some("hahaha")));
        assert!(is_gibberish(Some("lol lol lol")));
        // Real words with repeated syllables stay clean
        assert!(!is_gibberish(Some("banana")));
        assert!(!is_gibberish(Some("Mississippi")));
        assert!(!is_gibberish(Some("murmur")));
        assert!(!is_gibberish(Some("bonbon")));
        assert!(!is_short_cycle("papaya"));
    }

    #[test]
    fn test_all_identical_needs_two_answers() {
        assert!(!all_identical(&[Some(3), None, None]));
        assert!(all_identical(&[Some(3), None, Some(3)]));
        assert!(!all_identical(&[Some(3), Some(4)]));
        assert!(!all_identical(&[]));
    }

    #[test]
    fn test_speeder_threshold() {
        let fast = record_with(Some(179), json!({}));
        let slow = record_with(Some(180), json!({}));
        let unknown = record_with(None, json!({}));
        assert!(compute_quality_flags(&fast).qc_speeder);
        assert!(!compute_quality_flags(&slow).qc_speeder);
        assert!(!compute_quality_flags(&unknown).qc_speeder);
    }

    #[test]
    fn test_straightliner_k1_and_k2_per_retailer() {
        let mut answers = Map::new();
        for (i, attr) in KPC_ATTRIBUTES.iter().enumerate() {
            answers.insert(format!("k1_imp_{}", attr.code), json!(4));
            // r1 varied, r2 straight-lined
            answers.insert(
                format!("k2_perf_r1_{}", attr.code),
                json!(1 + (i as i64 % 5)),
            );
            answers.insert(format!("k2_perf_r2_{}", attr.code), json!(5));
        }
        let flags = compute_quality_flags(&record_with(Some(600), Value::Object(answers)));
        assert!(flags.qc_straightliner_k1);
        assert!(flags.qc_straightliner_k2);
    }

    #[test]
    fn test_gibberish_fields() {
        let record = record_with(
            Some(600),
            json!({
                "nps_r1_verbatim": "Great meat counter",
                "nps_r2_verbatim": "asdasdasd",
                "fareway_improve_verbatim": "Open on Sundays please",
                "fareway_tryme_verbatim": "bbbbbbbb",
            }),
        );
        let flags = compute_quality_flags(&record);
        assert!(flags.qc_gibberish_nps);
        assert!(!flags.qc_gibberish_l1a);
        assert!(flags.qc_gibberish_l2a);
    }

    #[test]
    fn test_flags_idempotent() {
        let record = record_with(
            Some(95),
            json!({ "k1_imp_lowest_price": 2, "k1_imp_best_value": 2, "nps_r1_verbatim": "qwrtyp" }),
        );
        let first = compute_quality_flags(&record);
        let second = compute_quality_flags(&record);
        assert_eq!(first, second);
        assert_eq!(first.to_fields(), second.to_fields());
    }

    #[test]
    fn test_to_fields_emits_zero_one() {
        let flags = QualityFlags {
            qc_speeder: true,
            ..Default::default()
        };
        let fields = flags.to_fields();
        assert_eq!(fields["qc_speeder"], json!(1));
        assert_eq!(fields["qc_gibberish_l2a"], json!(0));
        assert_eq!(fields.len(), 6);
    }
}
