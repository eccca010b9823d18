/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{borrow::Cow, sync::Arc, time::Duration};

use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    system_conf::read_system_conf,
    AsyncResolver,
};

use crate::{Error, Resolver, ScoringConfig, Txt, DEFAULT_DKIM_SELECTORS};

use super::cache::TxtCache;

pub(crate) const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(15);

impl Resolver {
    pub fn new_cloudflare_tls() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::cloudflare_tls(), default_opts(), 128)
    }

    pub fn new_cloudflare() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::cloudflare(), default_opts(), 128)
    }

    pub fn new_google() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::google(), default_opts(), 128)
    }

    pub fn new_quad9() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::quad9(), default_opts(), 128)
    }

    pub fn new_quad9_tls() -> Result<Self, ResolveError> {
        Self::with_capacity(ResolverConfig::quad9_tls(), default_opts(), 128)
    }

    pub fn new_system_conf() -> Result<Self, ResolveError> {
        let (config, options) = read_system_conf()?;
        Self::with_capacity(config, options, 128)
    }

    pub fn with_capacity(
        config: ResolverConfig,
        options: ResolverOpts,
        capacity: usize,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            resolver: AsyncResolver::tokio(config, options)?,
            cache_txt: TxtCache::with_capacity(capacity),
            dkim_selectors: DEFAULT_DKIM_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scoring: ScoringConfig::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            pipeline_timeout: DEFAULT_PIPELINE_TIMEOUT,
        })
    }

    /// Replaces the candidate selector list probed by the DKIM pipeline.
    pub fn with_dkim_selectors(mut self, selectors: impl IntoIterator<Item = String>) -> Self {
        self.dkim_selectors = selectors.into_iter().collect();
        self
    }

    /// Replaces the rubric weight tables.
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Sets the per-lookup and per-pipeline deadlines.
    pub fn with_timeouts(mut self, lookup: Duration, pipeline: Duration) -> Self {
        self.lookup_timeout = lookup;
        self.pipeline_timeout = pipeline;
        self
    }

    /// Returns every TXT string published at `key`, multi-chunk records
    /// joined. Answers are cached under the queried FQDN until their TTL
    /// expires.
    pub async fn txt_lookup<'x>(&self, key: impl IntoFqdn<'x>) -> crate::Result<Arc<Vec<String>>> {
        let key = key.into_fqdn();
        if let Some(value) = self.cache_txt.get(key.as_ref()) {
            return value.unwrap_records();
        }

        #[cfg(any(test, feature = "test"))]
        if true {
            return mock_resolve(key.as_ref());
        }

        let txt_lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.resolver.txt_lookup(key.as_ref()),
        )
        .await
        .map_err(|_| Error::DnsTimeout)??;

        let records = txt_lookup
            .as_lookup()
            .record_iter()
            .filter_map(|r| {
                let txt_data = r.data()?.as_txt()?.txt_data();
                match txt_data.len() {
                    1 => String::from_utf8_lossy(txt_data[0].as_ref())
                        .into_owned()
                        .into(),
                    0 => None,
                    _ => {
                        let mut entry = Vec::with_capacity(255 * txt_data.len());
                        for data in txt_data {
                            entry.extend_from_slice(data);
                        }
                        String::from_utf8_lossy(&entry).into_owned().into()
                    }
                }
            })
            .collect::<Vec<_>>();

        self.cache_txt
            .insert(
                key.into_owned(),
                Txt::Records(Arc::new(records)),
                txt_lookup.valid_until(),
            )
            .unwrap_records()
    }

    #[cfg(any(test, feature = "test"))]
    pub fn txt_add<'x>(
        &self,
        name: impl IntoFqdn<'x>,
        value: impl Into<Txt>,
        valid_until: std::time::Instant,
    ) {
        self.cache_txt
            .insert(name.into_fqdn().into_owned(), value.into(), valid_until);
    }
}

fn default_opts() -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.timeout = DEFAULT_LOOKUP_TIMEOUT;
    // One retry for transient failures; NXDOMAIN is never retried by the
    // underlying resolver.
    opts.attempts = 2;
    opts
}

impl Txt {
    pub(crate) fn unwrap_records(self) -> crate::Result<Arc<Vec<String>>> {
        match self {
            Txt::Records(records) => Ok(records),
            Txt::Error(err) => Err(err),
        }
    }
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                Error::DnsRecordNotFound(*response_code)
            }
            ResolveErrorKind::Timeout => Error::DnsTimeout,
            _ => Error::DnsError(err.to_string()),
        }
    }
}

impl From<Vec<String>> for Txt {
    fn from(records: Vec<String>) -> Self {
        Txt::Records(Arc::new(records))
    }
}

impl From<&str> for Txt {
    fn from(record: &str) -> Self {
        Txt::Records(Arc::new(vec![record.to_string()]))
    }
}

impl From<Error> for Txt {
    fn from(err: Error) -> Self {
        Txt::Error(err)
    }
}

pub trait IntoFqdn<'x> {
    fn into_fqdn(self) -> Cow<'x, str>;
}

impl<'x> IntoFqdn<'x> for String {
    fn into_fqdn(self) -> Cow<'x, str> {
        if self.ends_with('.') {
            self.to_lowercase().into()
        } else {
            format!("{}.", self.to_lowercase()).into()
        }
    }
}

impl<'x> IntoFqdn<'x> for &'x str {
    fn into_fqdn(self) -> Cow<'x, str> {
        if self.ends_with('.') {
            self.to_lowercase().into()
        } else {
            format!("{}.", self.to_lowercase()).into()
        }
    }
}

impl<'x> IntoFqdn<'x> for &'x String {
    fn into_fqdn(self) -> Cow<'x, str> {
        self.as_str().into_fqdn()
    }
}

#[cfg(any(test, feature = "test"))]
pub fn mock_resolve<T>(domain: &str) -> crate::Result<T> {
    Err(if domain.contains("_parse_error.") {
        Error::ParseError
    } else if domain.contains("_dns_error.") {
        Error::DnsError("mock".to_string())
    } else if domain.contains("_dns_timeout.") {
        Error::DnsTimeout
    } else {
        Error::DnsRecordNotFound(trust_dns_resolver::proto::op::ResponseCode::NXDomain)
    })
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::{Error, Resolver};

    #[tokio::test]
    async fn cached_txt_records() {
        let resolver = Resolver::new_cloudflare().unwrap();
        let valid_until = Instant::now() + Duration::from_secs(60);
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);
        resolver.txt_add(
            "seeded-error.example.com",
            Error::DnsTimeout,
            valid_until,
        );

        assert_eq!(
            resolver.txt_lookup("example.com").await.unwrap().as_ref(),
            &vec!["v=spf1 -all".to_string()]
        );
        assert_eq!(
            resolver.txt_lookup("seeded-error.example.com").await,
            Err(Error::DnsTimeout)
        );
        // Unknown names fall through to the mock NXDOMAIN answer.
        assert!(matches!(
            resolver.txt_lookup("unknown.example.com").await,
            Err(Error::DnsRecordNotFound(_))
        ));
    }
}
