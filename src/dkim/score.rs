/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tracing::debug;

use crate::{
    report::{self, ProtocolScore, ScoreItem},
    Error, Resolver,
};

use super::{DkimRecord, DomainKey, KeyStrength};

/// Point weights behind the DKIM rubric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkimWeights {
    pub has_record: u32,
    pub version: u32,
    pub key_type: u32,
    pub key_strength: u32,
    /// Awarded instead of `key_strength` for 1024-bit keys.
    pub key_strength_partial: u32,
}

impl Default for DkimWeights {
    fn default() -> Self {
        DkimWeights {
            has_record: 25,
            version: 15,
            key_type: 15,
            key_strength: 45,
            key_strength_partial: 20,
        }
    }
}

impl Resolver {
    /// Probes `<selector>._domainkey.<domain>` for every candidate
    /// selector. A selector with no record is a non-match, not an error.
    pub async fn resolve_dkim(&self, domain: &str, selectors: &[String]) -> Vec<DkimRecord> {
        let mut records = Vec::new();
        for selector in selectors {
            let name = format!("{}._domainkey.{}", selector, domain);
            let txts = match self.txt_lookup(name.as_str()).await {
                Ok(txts) => txts,
                Err(err) => {
                    debug!(name = %name, error = %err, "no DKIM record for selector");
                    continue;
                }
            };
            for txt in txts.iter() {
                match DomainKey::parse(txt) {
                    Ok(parsed_data) => {
                        records.push(DkimRecord {
                            domain: domain.to_string(),
                            selector: selector.clone(),
                            raw_record: txt.clone(),
                            parsed_data,
                            retrieved_at: report::timestamp(),
                        });
                        break;
                    }
                    Err(err) => {
                        debug!(name = %name, error = %err, "TXT string is not a key record");
                    }
                }
            }
        }
        records
    }
}

/// Grades the strongest key found across all matched selectors.
pub fn score(records: &[DkimRecord], error: Option<&Error>, weights: &DkimWeights) -> ProtocolScore {
    let best = records
        .iter()
        .max_by_key(|record| record.parsed_data.strength());

    let best = match best {
        Some(best) => best,
        None => {
            let details = error.map_or_else(
                || "no DKIM record found for any candidate selector".to_string(),
                |err| err.to_string(),
            );
            return ProtocolScore::from_items(vec![
                ScoreItem::graded(
                    "hasDkimRecord",
                    "A DKIM key is published for at least one selector",
                    weights.has_record,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "validVersion",
                    "Key record declares v=DKIM1",
                    weights.version,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "recognizedKeyType",
                    "Key type is a recognized algorithm",
                    weights.key_type,
                    false,
                    details.clone(),
                ),
                ScoreItem::graded(
                    "keyStrength",
                    "Published key is at least 2048 bits",
                    weights.key_strength,
                    false,
                    details,
                ),
            ]);
        }
    };

    let key = &best.parsed_data;
    let strength = key.strength();
    let (strength_score, strength_details) = match strength {
        KeyStrength::Bits2048 | KeyStrength::Ed25519 => (
            weights.key_strength,
            format!(
                "selector '{}' publishes a strong key (~{} bits, {})",
                best.selector,
                strength.estimated_bits(),
                key.key_type
            ),
        ),
        KeyStrength::Bits1024 => (
            weights.key_strength_partial,
            format!(
                "selector '{}' publishes a 1024-bit key; 2048 bits recommended",
                best.selector
            ),
        ),
        KeyStrength::Bits512 => (
            0,
            format!(
                "selector '{}' publishes a weak key (~512 bits)",
                best.selector
            ),
        ),
        KeyStrength::Revoked => (
            0,
            format!("revoked key: selector '{}' publishes an empty p= tag", best.selector),
        ),
    };

    ProtocolScore::from_items(vec![
        ScoreItem::graded(
            "hasDkimRecord",
            "A DKIM key is published for at least one selector",
            weights.has_record,
            true,
            format!(
                "found {} record(s), selectors: {}",
                records.len(),
                records
                    .iter()
                    .map(|r| r.selector.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
        ScoreItem::graded(
            "validVersion",
            "Key record declares v=DKIM1",
            weights.version,
            key.version == "DKIM1",
            if key.version == "DKIM1" {
                "v=DKIM1".to_string()
            } else {
                format!("unexpected version tag '{}'", key.version)
            },
        ),
        ScoreItem::graded(
            "recognizedKeyType",
            "Key type is a recognized algorithm",
            weights.key_type,
            matches!(key.key_type.as_str(), "rsa" | "ed25519"),
            format!("k={}", key.key_type),
        ),
        ScoreItem::new(
            "keyStrength",
            "Published key is at least 2048 bits",
            strength_score,
            weights.key_strength,
            strength_details,
        ),
    ])
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::{Resolver, ScoringConfig};

    use super::score;

    fn resolver() -> (Resolver, Instant) {
        (
            Resolver::new_cloudflare().unwrap(),
            Instant::now() + Duration::from_secs(60),
        )
    }

    fn selectors(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn strong_key_scores_full() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "selector1._domainkey.example.com",
            format!("v=DKIM1; k=rsa; p={}", "A".repeat(392)).as_str(),
            valid_until,
        );

        let records = resolver
            .resolve_dkim("example.com", &selectors(&["default", "selector1"]))
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].selector, "selector1");

        let result = score(&records, None, &ScoringConfig::default().dkim);
        assert_eq!(result.percentage, 100);
        assert_eq!(result.grade.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn revoked_key_scores_zero_strength() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "default._domainkey.example.com",
            "v=DKIM1; k=rsa; p=",
            valid_until,
        );

        let records = resolver
            .resolve_dkim("example.com", &selectors(&["default"]))
            .await;
        let result = score(&records, None, &ScoringConfig::default().dkim);
        let strength = result
            .score_items
            .iter()
            .find(|item| item.name == "keyStrength")
            .unwrap();
        assert_eq!(strength.score, 0);
        assert!(!strength.passed);
        assert!(strength.details.contains("revoked key"), "{}", strength.details);
    }

    #[tokio::test]
    async fn weak_1024_bit_key_gets_partial_credit() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "default._domainkey.example.com",
            format!("v=DKIM1; k=rsa; p={}", "A".repeat(216)).as_str(),
            valid_until,
        );

        let records = resolver
            .resolve_dkim("example.com", &selectors(&["default"]))
            .await;
        let result = score(&records, None, &ScoringConfig::default().dkim);
        let strength = result
            .score_items
            .iter()
            .find(|item| item.name == "keyStrength")
            .unwrap();
        assert_eq!(strength.score, 20);
        assert!(!strength.passed);
    }

    #[tokio::test]
    async fn strongest_selector_wins() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "default._domainkey.example.com",
            "v=DKIM1; k=rsa; p=",
            valid_until,
        );
        resolver.txt_add(
            "google._domainkey.example.com",
            format!("v=DKIM1; k=rsa; p={}", "A".repeat(392)).as_str(),
            valid_until,
        );

        let records = resolver
            .resolve_dkim("example.com", &selectors(&["default", "google"]))
            .await;
        assert_eq!(records.len(), 2);

        let result = score(&records, None, &ScoringConfig::default().dkim);
        assert_eq!(result.percentage, 100);
    }

    #[tokio::test]
    async fn missing_selectors_score_zero() {
        let (resolver, _) = resolver();
        let records = resolver
            .resolve_dkim("example.com", &selectors(&["default", "google"]))
            .await;
        assert!(records.is_empty());

        let result = score(&records, None, &ScoringConfig::default().dkim);
        assert_eq!(result.total_score, 0);
        assert_eq!(result.grade.as_deref(), Some("F"));
    }
}
