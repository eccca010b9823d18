/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

pub mod parse;
pub mod score;

use std::fmt::Display;

use serde::Serialize;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "quarantine")]
    Quarantine,
    #[serde(rename = "reject")]
    Reject,
    /// Missing or unrecognized `p` tag; serialized as `none` but scored
    /// separately.
    #[serde(rename = "none")]
    Unspecified,
}

impl Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Policy::Quarantine => "quarantine",
            Policy::Reject => "reject",
            Policy::None | Policy::Unspecified => "none",
        })
    }
}

/// Parsed `_dmarc.<domain>` policy record.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dmarc {
    pub version: String,
    pub policy: Policy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain_policy: Option<Policy>,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_emails: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forensic_emails: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_options: Option<Vec<String>>,
}

/// The policy record as surfaced in reports.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DmarcRecord {
    pub domain: String,
    pub raw_record: String,
    pub parsed_data: Dmarc,
    pub retrieved_at: String,
}

/// Result of the DMARC pipeline's resolution step. A missing record is
/// captured here and graded, never raised past the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmarcOutcome {
    pub record: Option<DmarcRecord>,
    pub multiple_records: bool,
    pub error: Option<crate::Error>,
}
