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

use crate::Error;

pub(crate) const V: u64 = b'v' as u64;
pub(crate) const K: u64 = b'k' as u64;
pub(crate) const H: u64 = b'h' as u64;
pub(crate) const P: u64 = b'p' as u64;
pub(crate) const N: u64 = b'n' as u64;
pub(crate) const T: u64 = b't' as u64;

/// Tolerant cursor over `tag=value` DNS TXT grammars (DKIM key records,
/// DMARC policy records). Keys are packed into a `u64`, one byte per
/// lowercased letter, which keeps tag dispatch a plain integer match.
pub(crate) trait TagParser: Sized {
    fn key(&mut self) -> Option<u64>;
    fn match_bytes(&mut self, bytes: &[u8]) -> bool;
    fn tag(&mut self) -> String;
    fn number(&mut self) -> Option<u64>;
    fn items(&mut self, separator: u8) -> Vec<String>;
    fn ignore(&mut self);
    fn seek_tag_end(&mut self) -> bool;
}

impl TagParser for Iter<'_, u8> {
    #[allow(clippy::while_let_on_iterator)]
    fn key(&mut self) -> Option<u64> {
        let mut key: u64 = 0;
        let mut shift = 0;

        while let Some(&ch) = self.next() {
            match ch {
                b'a'..=b'z' | b'0'..=b'9' if shift < 64 => {
                    key |= (ch as u64) << shift;
                    shift += 8;
                }
                b'A'..=b'Z' if shift < 64 => {
                    key |= ((ch - b'A' + b'a') as u64) << shift;
                    shift += 8;
                }
                b' ' | b'\t' | b'\r' | b'\n' => (),
                b'=' => {
                    return key.into();
                }
                b';' => {
                    key = 0;
                    shift = 0;
                }
                _ => {
                    key = u64::MAX;
                    shift = 64;
                }
            }
        }

        None
    }

    #[inline(always)]
    #[allow(clippy::while_let_on_iterator)]
    fn match_bytes(&mut self, bytes: &[u8]) -> bool {
        'outer: for byte in bytes {
            while let Some(&ch) = self.next() {
                if !ch.is_ascii_whitespace() {
                    if ch.eq_ignore_ascii_case(byte) {
                        continue 'outer;
                    } else {
                        return false;
                    }
                }
            }
            return false;
        }

        true
    }

    #[inline(always)]
    fn tag(&mut self) -> String {
        let mut tag = Vec::with_capacity(20);
        for &ch in self {
            if ch == b';' {
                break;
            } else if !ch.is_ascii_whitespace() {
                tag.push(ch);
            }
        }
        String::from_utf8_lossy(&tag).into_owned()
    }

    #[inline(always)]
    fn number(&mut self) -> Option<u64> {
        let mut num: u64 = 0;
        let mut has_digits = false;

        for &ch in self {
            if ch == b';' {
                break;
            } else if ch.is_ascii_digit() {
                num = (num.saturating_mul(10)).saturating_add((ch - b'0') as u64);
                has_digits = true;
            } else if !ch.is_ascii_whitespace() {
                return None;
            }
        }

        if has_digits {
            num.into()
        } else {
            None
        }
    }

    fn items(&mut self, separator: u8) -> Vec<String> {
        let mut buf = Vec::with_capacity(10);
        let mut items = Vec::new();
        for &ch in self {
            if ch == separator {
                if !buf.is_empty() {
                    items.push(String::from_utf8_lossy(&buf).into_owned());
                    buf.clear();
                }
            } else if ch == b';' {
                break;
            } else if !ch.is_ascii_whitespace() {
                buf.push(ch);
            }
        }
        if !buf.is_empty() {
            items.push(String::from_utf8_lossy(&buf).into_owned());
        }
        items
    }

    #[inline(always)]
    fn ignore(&mut self) {
        for &ch in self {
            if ch == b';' {
                break;
            }
        }
    }

    #[inline(always)]
    fn seek_tag_end(&mut self) -> bool {
        for &ch in self {
            if ch == b';' {
                return true;
            } else if !ch.is_ascii_whitespace() {
                return false;
            }
        }
        true
    }
}

/// Lowercases and validates a queried domain name. The only error that
/// aborts a whole request before any resolution starts.
pub(crate) fn normalize_domain(domain: &str) -> crate::Result<String> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_valid_domain() {
        Ok(domain)
    } else {
        Err(Error::InvalidDomain)
    }
}

pub(crate) trait ValidateDomain {
    fn is_valid_domain(&self) -> bool;
}

impl ValidateDomain for str {
    fn is_valid_domain(&self) -> bool {
        if self.is_empty() || self.len() > 253 || !self.contains('.') {
            return false;
        }
        self.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == b'-' || ch == b'_')
        })
    }
}

#[cfg(test)]
mod test {
    use super::{normalize_domain, TagParser, ValidateDomain};

    #[test]
    fn packed_keys() {
        let mut iter = b"v=DKIM1; k=rsa; pct=100".iter();
        assert_eq!(iter.key(), Some(super::V));
        iter.ignore();
        assert_eq!(iter.key(), Some(super::K));
        iter.ignore();
        assert_eq!(
            iter.key(),
            Some((b'p' as u64) | ((b'c' as u64) << 8) | ((b't' as u64) << 16))
        );
        assert_eq!(iter.number(), Some(100));
    }

    #[test]
    fn tag_values() {
        let mut iter = b" rsa ; n = some notes".iter();
        assert_eq!(iter.tag(), "rsa");
        iter.key();
        assert_eq!(iter.tag(), "somenotes");
    }

    #[test]
    fn separated_items() {
        let mut iter = b"y : s ; next".iter();
        assert_eq!(iter.items(b':'), vec!["y".to_string(), "s".to_string()]);
    }

    #[test]
    fn domain_validation() {
        for domain in ["example.com", "sub.example.co.uk", "xn--e1afmkfd.xn--p1ai"] {
            assert!(domain.is_valid_domain(), "{}", domain);
        }
        for domain in ["", "example", "-bad.example.com", "exa mple.com", "a..b"] {
            assert!(!domain.is_valid_domain(), "{}", domain);
        }
        assert_eq!(
            normalize_domain(" Example.COM. ").unwrap(),
            "example.com".to_string()
        );
        assert!(normalize_domain("not a domain").is_err());
    }
}
