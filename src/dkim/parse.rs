/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::{
    common::parse::{TagParser, H, K, N, P, T, V},
    Error,
};

use super::{DomainKey, KeyStrength};

// DER-encoded RSA SubjectPublicKeyInfo sizes: a 2048-bit key is ~294
// bytes, a 1024-bit key ~162, a 512-bit key ~94.
const BYTES_2048: usize = 250;
const BYTES_1024: usize = 120;

impl DomainKey {
    /// Parses a DKIM key record. Tolerant of unknown tags; the `p` tag is
    /// required (an empty value means a revoked key, a missing tag means
    /// this TXT string is not a key record at all).
    #[allow(clippy::while_let_on_iterator)]
    pub fn parse(record: &str) -> crate::Result<Self> {
        let mut key = DomainKey {
            version: String::new(),
            algorithm: String::new(),
            key_type: "rsa".to_string(),
            public_key: String::new(),
            flags: None,
            notes: None,
        };
        let mut has_public_key = false;

        let mut record = record.as_bytes().iter();
        while let Some(tag) = record.key() {
            match tag {
                V => key.version = record.tag(),
                K => key.key_type = record.tag().to_ascii_lowercase(),
                H => key.algorithm = record.tag().to_ascii_lowercase(),
                P => {
                    key.public_key = record.tag();
                    has_public_key = true;
                }
                T => {
                    let flags = record.items(b':');
                    if !flags.is_empty() {
                        key.flags = Some(flags);
                    }
                }
                N => {
                    let notes = record.tag();
                    if !notes.is_empty() {
                        key.notes = Some(notes);
                    }
                }
                _ => record.ignore(),
            }
        }

        if has_public_key {
            Ok(key)
        } else {
            Err(Error::ParseError)
        }
    }

    /// Estimates key strength from the base64 length of the `p` tag:
    /// bytes = chars * 3 / 4, bucketed into {512, 1024, >=2048} bits.
    pub fn strength(&self) -> KeyStrength {
        let chars = self
            .public_key
            .bytes()
            .filter(|ch| !ch.is_ascii_whitespace() && *ch != b'=')
            .count();
        if chars == 0 {
            return KeyStrength::Revoked;
        }
        if self.key_type == "ed25519" {
            return KeyStrength::Ed25519;
        }
        match chars * 3 / 4 {
            BYTES_2048.. => KeyStrength::Bits2048,
            BYTES_1024.. => KeyStrength::Bits1024,
            _ => KeyStrength::Bits512,
        }
    }
}
