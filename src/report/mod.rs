/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

pub mod build;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;

use crate::{
    dkim::DkimRecord,
    dmarc::DmarcRecord,
    spf::{validate::ValidationResults, SpfRecord},
};

/// One atomic rubric line. Immutable once computed.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreItem {
    pub name: String,
    pub description: String,
    pub score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub details: String,
}

impl ScoreItem {
    pub(crate) fn new(
        name: &str,
        description: &str,
        score: u32,
        max_score: u32,
        details: impl Into<String>,
    ) -> Self {
        ScoreItem {
            name: name.to_string(),
            description: description.to_string(),
            score,
            max_score,
            passed: score == max_score,
            details: details.into(),
        }
    }

    pub(crate) fn graded(
        name: &str,
        description: &str,
        max_score: u32,
        passed: bool,
        details: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            description,
            if passed { max_score } else { 0 },
            max_score,
            details,
        )
    }
}

/// Weighted rubric outcome for one protocol.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolScore {
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    pub score_items: Vec<ScoreItem>,
}

impl ProtocolScore {
    pub(crate) fn from_items(score_items: Vec<ScoreItem>) -> Self {
        let total_score = score_items.iter().map(|item| item.score).sum();
        let max_possible_score = score_items.iter().map(|item| item.max_score).sum();
        let percentage = percentage(total_score, max_possible_score);
        ProtocolScore {
            total_score,
            max_possible_score,
            percentage,
            grade: Some(grade(percentage).to_string()),
            score_items,
        }
    }
}

/// Fixed A-F thresholds: A >= 90, B >= 80, C >= 70, D >= 60, else F.
pub fn grade(percentage: u32) -> &'static str {
    match percentage {
        90.. => "A",
        80..=89 => "B",
        70..=79 => "C",
        60..=69 => "D",
        _ => "F",
    }
}

/// Rounds `100 * total / max` to the nearest integer.
pub(crate) fn percentage(total: u32, max: u32) -> u32 {
    if max == 0 {
        0
    } else {
        (total * 100 + max / 2) / max
    }
}

/// Opaque correlation token, generated once per report.
pub(crate) fn request_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpfReport {
    pub domain: String,
    pub spf_records: Vec<SpfRecord>,
    pub validation_results: ValidationResults,
    pub scoring_results: ProtocolScore,
    pub request_id: String,
    pub response_time: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DkimReport {
    pub domain: String,
    pub records: Vec<DkimRecord>,
    pub retrieved_at: String,
    pub score: ProtocolScore,
    pub request_id: String,
    pub response_time: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DmarcReport {
    pub record: Option<DmarcRecord>,
    pub score: ProtocolScore,
    pub request_id: String,
    pub response_time: u64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SecurityScores {
    pub spf: ProtocolScore,
    pub dkim: ProtocolScore,
    pub dmarc: ProtocolScore,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub domain: String,
    pub scores: SecurityScores,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub percentage: u32,
    pub request_id: String,
    pub response_time: u64,
    pub timestamp: String,
}

impl SecurityReport {
    /// Overall grade on the same thresholds as the per-protocol grades.
    pub fn grade(&self) -> &'static str {
        grade(self.percentage)
    }
}

#[cfg(test)]
mod test {
    use super::{grade, percentage, request_id, ProtocolScore, ScoreItem};

    #[test]
    fn grade_thresholds() {
        for (pct, expected) in [
            (100, "A"),
            (95, "A"),
            (90, "A"),
            (89, "B"),
            (80, "B"),
            (79, "C"),
            (70, "C"),
            (69, "D"),
            (60, "D"),
            (59, "F"),
            (0, "F"),
        ] {
            assert_eq!(grade(pct), expected, "{}", pct);
        }
    }

    #[test]
    fn grade_is_monotonic() {
        let mut last = "F";
        for pct in 0..=100 {
            let current = grade(pct);
            assert!(current <= last, "{}: {} > {}", pct, current, last);
            last = current;
        }
    }

    #[test]
    fn percentage_rounds_to_nearest() {
        assert_eq!(percentage(0, 100), 0);
        assert_eq!(percentage(100, 100), 100);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(5, 0), 0);
    }

    #[test]
    fn totals_from_items() {
        let score = ProtocolScore::from_items(vec![
            ScoreItem::graded("a", "", 30, true, "ok"),
            ScoreItem::graded("b", "", 20, false, "bad"),
            ScoreItem::new("c", "", 25, 50, "half"),
        ]);
        assert_eq!(score.total_score, 55);
        assert_eq!(score.max_possible_score, 100);
        assert_eq!(score.percentage, 55);
        assert_eq!(score.grade.as_deref(), Some("F"));
        assert!(!score.score_items[2].passed);
    }

    #[test]
    fn request_ids_are_opaque_hex() {
        let id = request_id();
        assert_eq!(id.len(), 16);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
