/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{fmt::Display, sync::Arc, time::Duration};

use common::cache::TxtCache;
use trust_dns_resolver::{proto::op::ResponseCode, TokioAsyncResolver};

pub mod common;
pub mod dkim;
pub mod dmarc;
pub mod report;
pub mod spf;

/// Selectors probed when the caller does not supply a list. A policy
/// choice, not a protocol requirement; override it with
/// [`Resolver::with_dkim_selectors`].
pub const DEFAULT_DKIM_SELECTORS: &[&str] = &["default", "google", "selector1", "selector2"];

#[derive(Debug)]
pub struct Resolver {
    pub(crate) resolver: TokioAsyncResolver,
    pub(crate) cache_txt: TxtCache,
    pub(crate) dkim_selectors: Vec<String>,
    pub(crate) scoring: ScoringConfig,
    pub(crate) lookup_timeout: Duration,
    pub(crate) pipeline_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Txt {
    Records(Arc<Vec<String>>),
    Error(Error),
}

/// Weight tables for the three protocol rubrics. Kept injectable so tests
/// can substitute deterministic fixtures without touching pipeline logic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoringConfig {
    pub spf: spf::score::SpfWeights,
    pub dkim: dkim::score::DkimWeights,
    pub dmarc: dmarc::score::DmarcWeights,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidDomain,
    ParseError,
    InvalidRecordType,
    DnsError(String),
    DnsTimeout,
    DnsRecordNotFound(ResponseCode),
    LookupLimitExceeded,
    CycleDetected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidDomain => write!(f, "Invalid domain name."),
            Error::ParseError => write!(f, "Parse error."),
            Error::InvalidRecordType => write!(f, "Invalid or missing record."),
            Error::DnsError(err) => write!(f, "DNS resolution error: {}", err),
            Error::DnsTimeout => write!(f, "DNS lookup timed out."),
            Error::DnsRecordNotFound(code) => write!(f, "DNS record not found: {}.", code),
            Error::LookupLimitExceeded => write!(f, "Exceeded the maximum of 10 DNS lookups."),
            Error::CycleDetected(domain) => {
                write!(f, "Include cycle detected at {}.", domain)
            }
        }
    }
}
