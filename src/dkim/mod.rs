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

use serde::Serialize;

/// Parsed `<selector>._domainkey.<domain>` key record.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainKey {
    pub version: String,
    pub algorithm: String,
    pub key_type: String,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One selector record as surfaced in reports.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DkimRecord {
    pub domain: String,
    pub selector: String,
    pub raw_record: String,
    pub parsed_data: DomainKey,
    pub retrieved_at: String,
}

/// Estimated strength bucket for a published key. RSA moduli are bucketed
/// by the byte length of the base64 key material; the breakpoints here and
/// in the scorer are the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyStrength {
    /// Empty `p=` tag: the key was revoked by the publisher.
    Revoked,
    Bits512,
    Bits1024,
    Bits2048,
    /// 256-bit Ed25519 keys are treated as full strength.
    Ed25519,
}

impl KeyStrength {
    pub fn estimated_bits(&self) -> u32 {
        match self {
            KeyStrength::Revoked => 0,
            KeyStrength::Bits512 => 512,
            KeyStrength::Bits1024 => 1024,
            KeyStrength::Bits2048 => 2048,
            KeyStrength::Ed25519 => 256,
        }
    }
}
