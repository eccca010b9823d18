/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tracing::debug;

use crate::{
    report::{self, ProtocolScore, ScoreItem},
    Resolver,
};

use super::{Dmarc, DmarcOutcome, DmarcRecord, Policy};

/// Point weights behind the DMARC rubric. Forensic reporting is optional
/// and privacy-sensitive, so its absence costs little.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmarcWeights {
    pub has_record: u32,
    pub policy: u32,
    /// Awarded instead of `policy` for `p=quarantine`.
    pub policy_quarantine: u32,
    /// Awarded instead of `policy` for `p=none`.
    pub policy_none: u32,
    pub coverage: u32,
    pub aggregate_reporting: u32,
    pub forensic_reporting: u32,
}

impl Default for DmarcWeights {
    fn default() -> Self {
        DmarcWeights {
            has_record: 20,
            policy: 40,
            policy_quarantine: 25,
            policy_none: 5,
            coverage: 20,
            aggregate_reporting: 15,
            forensic_reporting: 5,
        }
    }
}

impl Resolver {
    /// Fetches and parses `_dmarc.<domain>`. Exactly one record is
    /// expected; with several, the first syntactically valid one is used
    /// and the surplus is noted for the scorer.
    pub async fn resolve_dmarc(&self, domain: &str) -> DmarcOutcome {
        let name = format!("_dmarc.{}", domain);
        let txts = match self.txt_lookup(name.as_str()).await {
            Ok(txts) => txts,
            Err(err) => {
                debug!(name = %name, error = %err, "no DMARC record");
                return DmarcOutcome {
                    record: None,
                    multiple_records: false,
                    error: Some(err),
                };
            }
        };

        let mut candidates = txts.iter().filter_map(|txt| {
            Dmarc::parse(txt)
                .ok()
                .map(|parsed| (txt.clone(), parsed))
        });
        match candidates.next() {
            Some((raw_record, parsed_data)) => DmarcOutcome {
                record: Some(DmarcRecord {
                    domain: domain.to_string(),
                    raw_record,
                    parsed_data,
                    retrieved_at: report::timestamp(),
                }),
                multiple_records: candidates.next().is_some(),
                error: None,
            },
            None => DmarcOutcome {
                record: None,
                multiple_records: false,
                error: Some(crate::Error::InvalidRecordType),
            },
        }
    }
}

pub fn score(outcome: &DmarcOutcome, weights: &DmarcWeights) -> ProtocolScore {
    let record = match &outcome.record {
        Some(record) => record,
        None => {
            let details = outcome.error.as_ref().map_or_else(
                || "no DMARC record found".to_string(),
                |err| err.to_string(),
            );
            return ProtocolScore::from_items(vec![
                ScoreItem::graded(
                    "hasDmarcRecord",
                    "A DMARC policy is published at _dmarc",
                    weights.has_record,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "policyStrength",
                    "Policy quarantines or rejects failing mail",
                    weights.policy,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "coveragePercentage",
                    "Policy applies to all mail (pct=100)",
                    weights.coverage,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "aggregateReporting",
                    "Aggregate reports are collected (rua)",
                    weights.aggregate_reporting,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "forensicReporting",
                    "Forensic reports are collected (ruf)",
                    weights.forensic_reporting,
                    false,
                    details,
                ),
            ]);
        }
    };

    let dmarc = &record.parsed_data;
    let (policy_score, policy_details) = match dmarc.policy {
        Policy::Reject => (weights.policy, format!("p={}", dmarc.policy)),
        Policy::Quarantine => (
            weights.policy_quarantine,
            format!("p={}; p=reject recommended", dmarc.policy),
        ),
        Policy::None => (
            weights.policy_none,
            format!("p={} only monitors and does not protect", dmarc.policy),
        ),
        Policy::Unspecified => (0, "missing or unrecognized p tag".to_string()),
    };

    let coverage_score =
        (weights.coverage * dmarc.percentage as u32 + 50) / 100;

    ProtocolScore::from_items(vec![
        ScoreItem::graded(
            "hasDmarcRecord",
            "A DMARC policy is published at _dmarc",
            weights.has_record,
            true,
            if outcome.multiple_records {
                format!(
                    "DMARC record found at _dmarc.{}; multiple records published, first valid one used",
                    record.domain
                )
            } else {
                format!("DMARC record found at _dmarc.{}", record.domain)
            },
        ),
        ScoreItem::new(
            "policyStrength",
            "Policy quarantines or rejects failing mail",
            policy_score,
            weights.policy,
            policy_details,
        ),
        ScoreItem::new(
            "coveragePercentage",
            "Policy applies to all mail (pct=100)",
            coverage_score,
            weights.coverage,
            format!("pct={}", dmarc.percentage),
        ),
        ScoreItem::graded(
            "aggregateReporting",
            "Aggregate reports are collected (rua)",
            weights.aggregate_reporting,
            dmarc.report_emails.is_some(),
            match &dmarc.report_emails {
                Some(emails) => format!("rua: {}", emails.join(", ")),
                None => "no aggregate reporting addresses".to_string(),
            },
        ),
        ScoreItem::graded(
            "forensicReporting",
            "Forensic reports are collected (ruf)",
            weights.forensic_reporting,
            dmarc.forensic_emails.is_some(),
            match &dmarc.forensic_emails {
                Some(emails) => format!("ruf: {}", emails.join(", ")),
                None => "no forensic reporting addresses (optional)".to_string(),
            },
        ),
    ])
}
