/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use ahash::AHashSet;
use tracing::{debug, warn};

use crate::{Error, Resolver};

use super::{Mechanism, Origin, Spf, SpfChain, SpfRecord, Term};

/// Budget for TXT fetches while walking one chain: the initial record plus
/// every include/redirect. Mirrors the RFC 7208 lookup limit and bounds the
/// chain length.
pub const MAX_LOOKUPS: u32 = 10;

/// One partially-walked record on the explicit traversal stack.
struct Frame {
    domain: String,
    terms: Vec<Term>,
    next: usize,
}

impl Resolver {
    /// Walks the include/redirect graph starting at `domain`, left-to-right
    /// within each record, depth-first across records. Uses an explicit
    /// frame stack with a visited-domain set and a shared lookup budget, so
    /// cycles and the lookup cap terminate the walk as first-class results
    /// rather than unbounded recursion. On `LookupLimitExceeded` or
    /// `CycleDetected` the partial chain built so far is returned alongside
    /// the error.
    pub async fn resolve_spf_chain(&self, domain: &str) -> SpfChain {
        let domain = domain.to_ascii_lowercase();
        let mut chain = SpfChain {
            records: Vec::new(),
            lookups: 1,
            multiple_initial: false,
            error: None,
        };
        let mut visited = AHashSet::new();
        visited.insert(domain.clone());

        let records = match self.spf_txt_lookup(&domain).await {
            Ok(records) => records,
            Err(err) => {
                debug!(domain = %domain, error = %err, "no usable SPF record");
                chain.error = Some(err);
                return chain;
            }
        };
        chain.multiple_initial = records.len() > 1;

        let root = match Spf::parse(&records[0]) {
            Ok(root) => root,
            Err(err) => {
                chain.error = Some(err);
                return chain;
            }
        };
        chain.records.push(SpfRecord {
            domain: domain.clone(),
            raw: root.raw.clone(),
            origin: Origin::Initial,
            terms: root.terms.clone(),
        });

        let mut stack = vec![Frame {
            domain,
            terms: root.terms,
            next: 0,
        }];

        while let Some(frame_idx) = stack.len().checked_sub(1) {
            let (term, frame_domain) = {
                let frame = &mut stack[frame_idx];
                match frame.terms.get(frame.next) {
                    Some(term) => {
                        frame.next += 1;
                        (term.clone(), frame.domain.clone())
                    }
                    None => {
                        stack.pop();
                        continue;
                    }
                }
            };

            let (target, origin) = match term {
                Term::Directive(directive) => match directive.mechanism {
                    Mechanism::Include { domain } => (domain, Origin::Include),
                    Mechanism::Ptr { .. } => {
                        debug!(domain = %frame_domain, "deprecated ptr mechanism");
                        continue;
                    }
                    // Other mechanisms are recorded inline for the
                    // validator and trigger no further resolution.
                    _ => continue,
                },
                Term::Redirect(domain) => {
                    // A redirect replaces the remainder of the record that
                    // carried it.
                    stack.pop();
                    (domain, Origin::Redirect)
                }
                _ => continue,
            };

            chain.lookups += 1;
            if chain.lookups > MAX_LOOKUPS {
                warn!(domain = %frame_domain, target = %target, "SPF lookup limit exceeded");
                chain.error = Some(Error::LookupLimitExceeded);
                break;
            }
            if !visited.insert(target.clone()) {
                warn!(domain = %frame_domain, target = %target, "SPF include cycle");
                chain.error = Some(Error::CycleDetected(target));
                break;
            }

            match self.spf_txt_lookup(&target).await {
                Ok(records) => match Spf::parse(&records[0]) {
                    Ok(spf) => {
                        chain.records.push(SpfRecord {
                            domain: target.clone(),
                            raw: spf.raw.clone(),
                            origin,
                            terms: spf.terms.clone(),
                        });
                        stack.push(Frame {
                            domain: target,
                            terms: spf.terms,
                            next: 0,
                        });
                    }
                    Err(err) => {
                        debug!(target = %target, error = %err, "unparsable SPF target");
                    }
                },
                Err(err) => {
                    // A dangling include or redirect is a validator
                    // concern, not a terminal resolution failure.
                    debug!(target = %target, error = %err, "unresolvable SPF target");
                }
            }
        }

        chain
    }

    /// Fetches the TXT strings at `domain` and keeps those that carry the
    /// `v=spf1` version prefix.
    async fn spf_txt_lookup(&self, domain: &str) -> crate::Result<Vec<String>> {
        let records = self
            .txt_lookup(domain)
            .await?
            .iter()
            .filter(|record| Spf::is_spf(record))
            .cloned()
            .collect::<Vec<_>>();
        if records.is_empty() {
            Err(Error::InvalidRecordType)
        } else {
            Ok(records)
        }
    }
}
