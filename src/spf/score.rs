/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::report::{ProtocolScore, ScoreItem};

use super::validate::ValidationResults;

/// Point weights behind the SPF rubric. The exact values are a documented
/// configuration decision, not a protocol requirement; they are fixed
/// across runs so that identical DNS answers grade identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfWeights {
    pub has_record: u32,
    pub safe_all: u32,
    pub syntax: u32,
    pub lookup_limit: u32,
    pub single_record: u32,
    pub no_deprecated: u32,
}

impl Default for SpfWeights {
    fn default() -> Self {
        SpfWeights {
            has_record: 30,
            safe_all: 25,
            syntax: 15,
            lookup_limit: 15,
            single_record: 10,
            no_deprecated: 5,
        }
    }
}

pub fn score(validation: &ValidationResults, weights: &SpfWeights) -> ProtocolScore {
    ProtocolScore::from_items(vec![
        ScoreItem::graded(
            "hasSpfRecord",
            "SPF record is published",
            weights.has_record,
            validation.has_spf_record.is_valid,
            validation.has_spf_record.details("SPF record found"),
        ),
        ScoreItem::graded(
            "unsafeAllMechanism",
            "Record ends with a restrictive 'all' qualifier",
            weights.safe_all,
            validation.unsafe_all_mechanism.is_valid,
            validation.unsafe_all_mechanism.details(&format!(
                "first 'all' qualifier: {}",
                validation.first_all_qualifier.qualifier
            )),
        ),
        ScoreItem::graded(
            "syntaxValidation",
            "Record parses without unrecognized terms",
            weights.syntax,
            validation.syntax_validation.is_valid,
            validation.syntax_validation.details("syntax is valid"),
        ),
        ScoreItem::graded(
            "maxTenSpfRecords",
            "Chain stays within the 10 DNS lookup limit",
            weights.lookup_limit,
            validation.max_ten_spf_records.is_valid,
            validation
                .max_ten_spf_records
                .details("within the lookup limit"),
        ),
        ScoreItem::graded(
            "oneInitialSpfRecord",
            "Exactly one SPF record at the root domain",
            weights.single_record,
            validation.one_initial_spf_record.is_valid,
            validation
                .one_initial_spf_record
                .details("a single record is published"),
        ),
        ScoreItem::graded(
            "deprecatedMechanisms",
            "No deprecated mechanisms in the chain",
            weights.no_deprecated,
            validation.deprecated_mechanisms.is_valid,
            validation
                .deprecated_mechanisms
                .details("no deprecated mechanisms"),
        ),
    ])
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::{spf::validate::validate, Resolver, ScoringConfig};

    use super::score;

    fn resolver() -> (Resolver, Instant) {
        (
            Resolver::new_cloudflare().unwrap(),
            Instant::now() + Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn strict_record_grades_a() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);

        let chain = resolver.resolve_spf_chain("example.com").await;
        let result = score(&validate(&chain), &ScoringConfig::default().spf);
        assert_eq!(result.percentage, 100);
        assert_eq!(result.grade.as_deref(), Some("A"));
        assert!(result.score_items.iter().all(|item| item.passed));
    }

    #[tokio::test]
    async fn pass_all_lowers_the_grade() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "example.com",
            "v=spf1 include:a.com include:b.com +all",
            valid_until,
        );

        let chain = resolver.resolve_spf_chain("example.com").await;
        let result = score(&validate(&chain), &ScoringConfig::default().spf);
        assert_eq!(result.total_score, 75);
        assert_eq!(result.grade.as_deref(), Some("C"));
        let unsafe_all = result
            .score_items
            .iter()
            .find(|item| item.name == "unsafeAllMechanism")
            .unwrap();
        assert!(!unsafe_all.passed);
        assert_eq!(unsafe_all.score, 0);
    }

    #[tokio::test]
    async fn missing_record_scores_zero() {
        let (resolver, _) = resolver();
        let chain = resolver.resolve_spf_chain("nothing.example.org").await;
        let result = score(&validate(&chain), &ScoringConfig::default().spf);
        assert_eq!(result.total_score, 0);
        assert_eq!(result.grade.as_deref(), Some("F"));
        let has_record = result
            .score_items
            .iter()
            .find(|item| item.name == "hasSpfRecord")
            .unwrap();
        assert_eq!(has_record.score, 0);
    }

    #[tokio::test]
    async fn weights_are_injectable() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);

        let mut weights = ScoringConfig::default().spf;
        weights.has_record = 1;
        weights.safe_all = 1;
        weights.syntax = 1;
        weights.lookup_limit = 1;
        weights.single_record = 1;
        weights.no_deprecated = 1;

        let chain = resolver.resolve_spf_chain("example.com").await;
        let result = score(&validate(&chain), &weights);
        assert_eq!(result.max_possible_score, 6);
        assert_eq!(result.total_score, 6);
    }
}
