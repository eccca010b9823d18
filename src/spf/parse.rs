/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::str::FromStr;

use crate::Error;

use super::{Directive, Mechanism, Qualifier, Spf, Term};

impl Spf {
    /// Parses a `v=spf1` TXT record. Tolerant: tokens that do not fit the
    /// grammar are preserved as [`Term::Invalid`] for the validator rather
    /// than aborting the parse; only a missing version prefix is fatal.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let mut tokens = raw.split_ascii_whitespace();
        match tokens.next() {
            Some(version) if version.eq_ignore_ascii_case("v=spf1") => (),
            _ => return Err(Error::InvalidRecordType),
        }

        Ok(Spf {
            raw: raw.to_string(),
            terms: tokens.map(Term::parse).collect(),
        })
    }

    pub(crate) fn is_spf(record: &str) -> bool {
        let record = record.trim_start();
        match record.get(..6) {
            Some(version) if version.eq_ignore_ascii_case("v=spf1") => record
                .as_bytes()
                .get(6)
                .map_or(true, |ch| ch.is_ascii_whitespace()),
            _ => false,
        }
    }
}

impl Term {
    fn parse(token: &str) -> Term {
        let (qualifier, rest) = match token.as_bytes().first() {
            Some(b'+') => (Qualifier::Pass, &token[1..]),
            Some(b'-') => (Qualifier::Fail, &token[1..]),
            Some(b'~') => (Qualifier::SoftFail, &token[1..]),
            Some(b'?') => (Qualifier::Neutral, &token[1..]),
            Some(ch) if ch.is_ascii_alphabetic() => (Qualifier::Pass, token),
            _ => return Term::Invalid(token.to_string()),
        };
        let explicit_qualifier = rest.len() != token.len();

        // Modifiers carry an '=' before any ':' or '/'; a modifier with an
        // explicit qualifier is not valid SPF.
        if let Some((name, value)) = rest.split_once('=') {
            if explicit_qualifier || !is_modifier_name(name) {
                return Term::Invalid(token.to_string());
            }
            return if name.eq_ignore_ascii_case("redirect") {
                Term::Redirect(value.to_ascii_lowercase())
            } else if name.eq_ignore_ascii_case("exp") {
                Term::Explanation(value.to_string())
            } else {
                Term::UnknownModifier(token.to_string())
            };
        }

        let (name, tail) = match rest.find(|ch| ch == ':' || ch == '/') {
            Some(pos) => (&rest[..pos], Some(&rest[pos..])),
            None => (rest, None),
        };
        let value = tail.and_then(|tail| tail.strip_prefix(':'));

        let mechanism = match name.to_ascii_lowercase().as_str() {
            "all" if tail.is_none() => Mechanism::All,
            "include" => match value {
                Some(domain) if !domain.is_empty() => Mechanism::Include {
                    domain: domain.to_ascii_lowercase(),
                },
                _ => return Term::Invalid(token.to_string()),
            },
            "exists" => match value {
                Some(domain) if !domain.is_empty() => Mechanism::Exists {
                    domain: domain.to_ascii_lowercase(),
                },
                _ => return Term::Invalid(token.to_string()),
            },
            "a" => Mechanism::A {
                spec: tail.map(|t| t.to_string()),
            },
            "mx" => Mechanism::Mx {
                spec: tail.map(|t| t.to_string()),
            },
            "ptr" => Mechanism::Ptr {
                spec: value.map(|v| v.to_ascii_lowercase()),
            },
            "ip4" => match value.and_then(parse_ip4) {
                Some((addr, mask)) => Mechanism::Ip4 { addr, mask },
                None => return Term::Invalid(token.to_string()),
            },
            "ip6" => match value.and_then(parse_ip6) {
                Some((addr, mask)) => Mechanism::Ip6 { addr, mask },
                None => return Term::Invalid(token.to_string()),
            },
            _ => return Term::Invalid(token.to_string()),
        };

        Term::Directive(Directive::new(qualifier, mechanism))
    }
}

fn is_modifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .map_or(false, |ch| ch.is_ascii_alphabetic())
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

fn parse_ip4(value: &str) -> Option<(std::net::Ipv4Addr, u8)> {
    let (addr, mask) = match value.split_once('/') {
        Some((addr, mask)) => (addr, u8::from_str(mask).ok().filter(|m| *m <= 32)?),
        None => (value, 32),
    };
    std::net::Ipv4Addr::from_str(addr).ok().map(|a| (a, mask))
}

fn parse_ip6(value: &str) -> Option<(std::net::Ipv6Addr, u8)> {
    let (addr, mask) = match value.split_once('/') {
        Some((addr, mask)) => (addr, u8::from_str(mask).ok().filter(|m| *m <= 128)?),
        None => (value, 128),
    };
    std::net::Ipv6Addr::from_str(addr).ok().map(|a| (a, mask))
}
