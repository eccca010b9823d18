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
pub mod resolve;
pub mod score;
pub mod validate;

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;

/*
      "+" pass
      "-" fail
      "~" softfail
      "?" neutral
*/
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Qualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Qualifier {
    pub fn as_char(&self) -> char {
        match self {
            Qualifier::Pass => '+',
            Qualifier::Fail => '-',
            Qualifier::SoftFail => '~',
            Qualifier::Neutral => '?',
        }
    }
}

/*
   mechanism        = ( all / include
                      / a / mx / ptr / ip4 / ip6 / exists )
*/
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Mechanism {
    All,
    Include {
        domain: String,
    },
    A {
        spec: Option<String>,
    },
    Mx {
        spec: Option<String>,
    },
    Ptr {
        spec: Option<String>,
    },
    Ip4 {
        addr: Ipv4Addr,
        mask: u8,
    },
    Ip6 {
        addr: Ipv6Addr,
        mask: u8,
    },
    Exists {
        domain: String,
    },
}

/*
    directive        = [ qualifier ] mechanism
*/
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Term {
    Directive(Directive),
    Redirect(String),
    Explanation(String),
    // Well-formed modifier this crate does not evaluate; allowed by the
    // grammar, ignored by the validator.
    UnknownModifier(String),
    // Token that does not fit the directive or modifier grammar at all.
    Invalid(String),
}

/// A single parsed `v=spf1` TXT record.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Spf {
    pub raw: String,
    pub terms: Vec<Term>,
}

/// How a record was reached during chain resolution.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Initial,
    Redirect,
    Include,
}

/// One node of the resolved include/redirect graph.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SpfRecord {
    pub domain: String,
    #[serde(rename = "spfRecord")]
    pub raw: String,
    #[serde(rename = "type")]
    pub origin: Origin,
    #[serde(skip)]
    pub(crate) terms: Vec<Term>,
}

/// Ordered sequence of visited records, insertion order = visitation
/// order. A terminal error leaves the partial chain in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfChain {
    pub records: Vec<SpfRecord>,
    pub lookups: u32,
    pub multiple_initial: bool,
    pub error: Option<crate::Error>,
}

impl SpfChain {
    pub(crate) fn failed(error: crate::Error) -> Self {
        SpfChain {
            records: Vec::new(),
            lookups: 0,
            multiple_initial: false,
            error: Some(error),
        }
    }

    /// All directives in traversal order, paired with the domain of the
    /// record that carried them.
    pub(crate) fn directives(&self) -> impl Iterator<Item = (&str, &Directive)> {
        self.records.iter().flat_map(|record| {
            record.terms.iter().filter_map(|term| match term {
                Term::Directive(directive) => Some((record.domain.as_str(), directive)),
                _ => None,
            })
        })
    }
}

impl Directive {
    pub fn new(qualifier: Qualifier, mechanism: Mechanism) -> Self {
        Directive {
            qualifier,
            mechanism,
        }
    }
}
