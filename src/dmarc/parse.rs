/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::slice::Iter;

use crate::{
    common::parse::{TagParser, V},
    Error,
};

use super::{Dmarc, Policy};

const P: u64 = b'p' as u64;
const SP: u64 = (b's' as u64) | (b'p' as u64) << 8;
const PCT: u64 = (b'p' as u64) | (b'c' as u64) << 8 | (b't' as u64) << 16;
const RUA: u64 = (b'r' as u64) | (b'u' as u64) << 8 | (b'a' as u64) << 16;
const RUF: u64 = (b'r' as u64) | (b'u' as u64) << 8 | (b'f' as u64) << 16;
const FO: u64 = (b'f' as u64) | (b'o' as u64) << 8;

impl Dmarc {
    /// Parses a DMARC policy record. Only a wrong version tag is fatal;
    /// unknown tags are skipped and malformed values fall back to their
    /// defaults, which the scorer then grades down.
    #[allow(clippy::while_let_on_iterator)]
    pub fn parse(record: &str) -> crate::Result<Self> {
        let mut record = record.as_bytes().iter();
        if record.key().unwrap_or(0) != V {
            return Err(Error::InvalidRecordType);
        }
        if !record.match_bytes(b"DMARC1") || !record.seek_tag_end() {
            return Err(Error::InvalidRecordType);
        }

        let mut dmarc = Dmarc {
            version: "DMARC1".to_string(),
            policy: Policy::Unspecified,
            subdomain_policy: None,
            percentage: 100,
            report_emails: None,
            forensic_emails: None,
            failure_options: None,
        };

        while let Some(key) = record.key() {
            match key {
                P => dmarc.policy = record.policy(),
                SP => dmarc.subdomain_policy = Some(record.policy()),
                PCT => {
                    dmarc.percentage = record.number().map_or(100, |pct| pct.min(100) as u8);
                }
                RUA => {
                    let uris = record.mail_addresses();
                    if !uris.is_empty() {
                        dmarc.report_emails = Some(uris);
                    }
                }
                RUF => {
                    let uris = record.mail_addresses();
                    if !uris.is_empty() {
                        dmarc.forensic_emails = Some(uris);
                    }
                }
                FO => {
                    let options = record.items(b':');
                    if !options.is_empty() {
                        dmarc.failure_options = Some(options);
                    }
                }
                _ => record.ignore(),
            }
        }

        // The subdomain policy inherits the domain policy when absent.
        if dmarc.subdomain_policy.is_none() {
            dmarc.subdomain_policy = Some(dmarc.policy);
        }

        Ok(dmarc)
    }
}

pub(crate) trait DmarcParser: Sized {
    fn policy(&mut self) -> Policy;
    fn mail_addresses(&mut self) -> Vec<String>;
}

impl DmarcParser for Iter<'_, u8> {
    fn policy(&mut self) -> Policy {
        match self.tag().to_ascii_lowercase().as_str() {
            "none" => Policy::None,
            "quarantine" => Policy::Quarantine,
            "reject" => Policy::Reject,
            _ => Policy::Unspecified,
        }
    }

    /// Splits a `rua`/`ruf` value into plain addresses: comma-separated
    /// `mailto:` URIs, optional `!size` suffixes dropped.
    fn mail_addresses(&mut self) -> Vec<String> {
        self.items(b',')
            .into_iter()
            .filter_map(|uri| {
                let uri = uri
                    .split_once('!')
                    .map_or(uri.as_str(), |(addr, _)| addr)
                    .trim();
                let addr = if uri.len() >= 7 && uri[..7].eq_ignore_ascii_case("mailto:") {
                    &uri[7..]
                } else {
                    uri
                };
                if addr.contains('@') {
                    Some(addr.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}
