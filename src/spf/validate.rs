/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use serde::Serialize;

use crate::Error;

use super::{Mechanism, Qualifier, SpfChain, Term};

/// Outcome of one named check.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ValidationResult {
    pub(crate) fn ok() -> Self {
        ValidationResult {
            is_valid: true,
            errors: None,
        }
    }

    pub(crate) fn fail(error: impl Into<String>) -> Self {
        ValidationResult {
            is_valid: false,
            errors: Some(vec![error.into()]),
        }
    }

    pub(crate) fn fail_all(errors: Vec<String>) -> Self {
        ValidationResult {
            is_valid: false,
            errors: Some(errors),
        }
    }

    pub(crate) fn details(&self, passed: &str) -> String {
        if self.is_valid {
            passed.to_string()
        } else {
            self.errors
                .as_deref()
                .unwrap_or_default()
                .join("; ")
        }
    }
}

/// Qualifier of the first `all` mechanism in chain traversal order, or
/// `none` when no `all` exists anywhere in the chain.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FirstAllQualifier {
    pub qualifier: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResults {
    pub has_spf_record: ValidationResult,
    pub syntax_validation: ValidationResult,
    pub one_initial_spf_record: ValidationResult,
    pub max_ten_spf_records: ValidationResult,
    pub deprecated_mechanisms: ValidationResult,
    pub unsafe_all_mechanism: ValidationResult,
    pub first_all_qualifier: FirstAllQualifier,
}

/// Runs the fixed set of named checks over a resolved (possibly partial)
/// chain. Without a root record every pass/fail check fails; nothing is
/// graded against a record that does not exist.
pub fn validate(chain: &SpfChain) -> ValidationResults {
    if chain.records.is_empty() {
        let reason = chain
            .error
            .as_ref()
            .map_or("no SPF record found".to_string(), |err| err.to_string());
        return ValidationResults {
            has_spf_record: ValidationResult::fail(reason.clone()),
            syntax_validation: ValidationResult::fail(reason.clone()),
            one_initial_spf_record: ValidationResult::fail(reason.clone()),
            max_ten_spf_records: ValidationResult::fail(reason.clone()),
            deprecated_mechanisms: ValidationResult::fail(reason.clone()),
            unsafe_all_mechanism: ValidationResult::fail(reason),
            first_all_qualifier: FirstAllQualifier {
                qualifier: "none".to_string(),
            },
        };
    }

    let first_all = chain
        .directives()
        .find(|(_, directive)| directive.mechanism == Mechanism::All)
        .map(|(_, directive)| directive.qualifier);
    let has_redirect = chain
        .records
        .iter()
        .flat_map(|record| record.terms.iter())
        .any(|term| matches!(term, Term::Redirect(_)));

    ValidationResults {
        has_spf_record: ValidationResult::ok(),
        syntax_validation: syntax_validation(chain),
        one_initial_spf_record: if chain.multiple_initial {
            ValidationResult::fail("more than one v=spf1 record published at the root domain")
        } else {
            ValidationResult::ok()
        },
        max_ten_spf_records: max_ten_spf_records(chain),
        deprecated_mechanisms: deprecated_mechanisms(chain),
        unsafe_all_mechanism: unsafe_all_mechanism(first_all, has_redirect),
        first_all_qualifier: FirstAllQualifier {
            qualifier: first_all.map_or("none".to_string(), |q| q.as_char().to_string()),
        },
    }
}

fn syntax_validation(chain: &SpfChain) -> ValidationResult {
    let errors = chain
        .records
        .iter()
        .flat_map(|record| {
            record.terms.iter().filter_map(move |term| match term {
                Term::Invalid(token) => {
                    Some(format!("{}: unrecognized term '{}'", record.domain, token))
                }
                _ => None,
            })
        })
        .collect::<Vec<_>>();
    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::fail_all(errors)
    }
}

fn max_ten_spf_records(chain: &SpfChain) -> ValidationResult {
    match &chain.error {
        Some(Error::LookupLimitExceeded) => {
            ValidationResult::fail("chain resolution exceeded the 10 DNS lookup limit")
        }
        Some(Error::CycleDetected(domain)) => {
            ValidationResult::fail(format!("include cycle detected at {}", domain))
        }
        _ => ValidationResult::ok(),
    }
}

fn deprecated_mechanisms(chain: &SpfChain) -> ValidationResult {
    let errors = chain
        .directives()
        .filter_map(|(domain, directive)| match directive.mechanism {
            Mechanism::Ptr { .. } => {
                Some(format!("{}: ptr mechanism is deprecated", domain))
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::fail_all(errors)
    }
}

fn unsafe_all_mechanism(first_all: Option<Qualifier>, has_redirect: bool) -> ValidationResult {
    match first_all {
        Some(Qualifier::Pass) => {
            ValidationResult::fail("'+all' allows any host to send mail for this domain")
        }
        Some(_) => ValidationResult::ok(),
        // Without an `all` the record neither passes nor fails unmatched
        // senders; a redirect delegates that decision instead.
        None if has_redirect => ValidationResult::ok(),
        None => ValidationResult::fail("no 'all' mechanism terminates the record"),
    }
}
