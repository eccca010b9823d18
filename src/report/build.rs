/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Instant;

use tokio::time::timeout;
use tracing::info;

use crate::{
    common::parse::normalize_domain,
    dkim::{self, DkimRecord},
    dmarc::{self, DmarcOutcome},
    spf::{self, validate::ValidationResults, SpfChain},
    Error, Resolver,
};

use super::{
    percentage, request_id, timestamp, DkimReport, DmarcReport, ProtocolScore, SecurityReport,
    SecurityScores, SpfReport,
};

pub(crate) struct SpfOutcome {
    pub(crate) chain: SpfChain,
    pub(crate) validation: ValidationResults,
    pub(crate) score: ProtocolScore,
}

impl Resolver {
    /// Evaluates the SPF posture of `domain`. Fails only on a malformed
    /// domain; every resolution problem is graded, not raised.
    pub async fn spf_report(&self, domain: &str) -> crate::Result<SpfReport> {
        let domain = normalize_domain(domain)?;
        let started = Instant::now();
        let outcome = self.evaluate_spf(&domain).await;
        Ok(SpfReport {
            domain,
            spf_records: outcome.chain.records,
            validation_results: outcome.validation,
            scoring_results: outcome.score,
            request_id: request_id(),
            response_time: started.elapsed().as_millis() as u64,
            timestamp: timestamp(),
        })
    }

    /// Evaluates the DKIM posture of `domain`, probing `selectors` when
    /// given and the configured candidate list otherwise.
    pub async fn dkim_report(
        &self,
        domain: &str,
        selectors: Option<&[String]>,
    ) -> crate::Result<DkimReport> {
        let domain = normalize_domain(domain)?;
        let started = Instant::now();
        let (records, score) = self.evaluate_dkim(&domain, selectors).await;
        Ok(DkimReport {
            domain,
            records,
            retrieved_at: timestamp(),
            score,
            request_id: request_id(),
            response_time: started.elapsed().as_millis() as u64,
            timestamp: timestamp(),
        })
    }

    /// Evaluates the DMARC posture of `domain`.
    pub async fn dmarc_report(&self, domain: &str) -> crate::Result<DmarcReport> {
        let domain = normalize_domain(domain)?;
        let started = Instant::now();
        let (outcome, score) = self.evaluate_dmarc(&domain).await;
        Ok(DmarcReport {
            record: outcome.record,
            score,
            request_id: request_id(),
            response_time: started.elapsed().as_millis() as u64,
            timestamp: timestamp(),
        })
    }

    /// Runs all three protocol pipelines concurrently and aggregates them
    /// into one report. A pipeline that fails or times out contributes
    /// zeroed findings; it never blocks or cancels its siblings.
    pub async fn security_report(&self, domain: &str) -> crate::Result<SecurityReport> {
        let domain = normalize_domain(domain)?;
        let started = Instant::now();
        info!(domain = %domain, "starting security evaluation");

        let (spf, (_, dkim_score), (_, dmarc_score)) = tokio::join!(
            self.evaluate_spf(&domain),
            self.evaluate_dkim(&domain, None),
            self.evaluate_dmarc(&domain),
        );

        let total_score =
            spf.score.total_score + dkim_score.total_score + dmarc_score.total_score;
        let max_possible_score = spf.score.max_possible_score
            + dkim_score.max_possible_score
            + dmarc_score.max_possible_score;
        let report = SecurityReport {
            domain,
            scores: SecurityScores {
                spf: spf.score,
                dkim: dkim_score,
                dmarc: dmarc_score,
            },
            total_score,
            max_possible_score,
            percentage: percentage(total_score, max_possible_score),
            request_id: request_id(),
            response_time: started.elapsed().as_millis() as u64,
            timestamp: timestamp(),
        };
        info!(
            domain = %report.domain,
            percentage = report.percentage,
            grade = report.grade(),
            "security evaluation finished"
        );
        Ok(report)
    }

    pub(crate) async fn evaluate_spf(&self, domain: &str) -> SpfOutcome {
        let chain = match timeout(self.pipeline_timeout, self.resolve_spf_chain(domain)).await {
            Ok(chain) => chain,
            Err(_) => SpfChain::failed(Error::DnsTimeout),
        };
        let validation = spf::validate::validate(&chain);
        let score = spf::score::score(&validation, &self.scoring.spf);
        SpfOutcome {
            chain,
            validation,
            score,
        }
    }

    pub(crate) async fn evaluate_dkim(
        &self,
        domain: &str,
        selectors: Option<&[String]>,
    ) -> (Vec<DkimRecord>, ProtocolScore) {
        let selectors = selectors.unwrap_or(&self.dkim_selectors);
        match timeout(self.pipeline_timeout, self.resolve_dkim(domain, selectors)).await {
            Ok(records) => {
                let score = dkim::score::score(&records, None, &self.scoring.dkim);
                (records, score)
            }
            Err(_) => (
                Vec::new(),
                dkim::score::score(&[], Some(&Error::DnsTimeout), &self.scoring.dkim),
            ),
        }
    }

    pub(crate) async fn evaluate_dmarc(&self, domain: &str) -> (DmarcOutcome, ProtocolScore) {
        let outcome = match timeout(self.pipeline_timeout, self.resolve_dmarc(domain)).await {
            Ok(outcome) => outcome,
            Err(_) => DmarcOutcome {
                record: None,
                multiple_records: false,
                error: Some(Error::DnsTimeout),
            },
        };
        let score = dmarc::score::score(&outcome, &self.scoring.dmarc);
        (outcome, score)
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::{Error, Resolver};

    fn resolver() -> (Resolver, Instant) {
        (
            Resolver::new_cloudflare().unwrap(),
            Instant::now() + Duration::from_secs(60),
        )
    }

    fn seed_healthy_domain(resolver: &Resolver, valid_until: Instant) {
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);
        resolver.txt_add(
            "default._domainkey.example.com",
            format!("v=DKIM1; k=rsa; p={}", "A".repeat(392)).as_str(),
            valid_until,
        );
        resolver.txt_add(
            "_dmarc.example.com",
            "v=DMARC1; p=reject; pct=100; rua=mailto:dmarc@example.com",
            valid_until,
        );
    }

    #[tokio::test]
    async fn aggregates_all_three_pipelines() {
        let (resolver, valid_until) = resolver();
        seed_healthy_domain(&resolver, valid_until);

        let report = resolver.security_report("example.com").await.unwrap();
        assert_eq!(
            report.total_score,
            report.scores.spf.total_score
                + report.scores.dkim.total_score
                + report.scores.dmarc.total_score
        );
        assert_eq!(report.max_possible_score, 300);
        assert_eq!(report.percentage, 98);
        assert_eq!(report.grade(), "A");
        assert_eq!(report.request_id.len(), 16);
    }

    #[tokio::test]
    async fn one_failing_pipeline_does_not_block_the_others() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);
        resolver.txt_add("_dmarc.example.com", Error::DnsTimeout, valid_until);

        let report = resolver.security_report("example.com").await.unwrap();
        assert_eq!(report.scores.spf.percentage, 100);
        assert_eq!(report.scores.dmarc.total_score, 0);
        let has_dmarc = report
            .scores
            .dmarc
            .score_items
            .iter()
            .find(|item| item.name == "hasDmarcRecord")
            .unwrap();
        assert!(has_dmarc.details.contains("timed out"), "{}", has_dmarc.details);
    }

    #[tokio::test]
    async fn scoring_is_idempotent() {
        let (resolver, valid_until) = resolver();
        seed_healthy_domain(&resolver, valid_until);

        let first = resolver.security_report("example.com").await.unwrap();
        let second = resolver.security_report("example.com").await.unwrap();
        assert_eq!(
            first.scores.spf.score_items,
            second.scores.spf.score_items
        );
        assert_eq!(first.scores.dkim.total_score, second.scores.dkim.total_score);
        assert_eq!(first.scores.dmarc.percentage, second.scores.dmarc.percentage);
        assert_eq!(first.total_score, second.total_score);
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn invalid_domain_is_rejected_up_front() {
        let (resolver, _) = resolver();
        for domain in ["", "not a domain", "nodots", "-bad.example.com"] {
            assert_eq!(
                resolver.security_report(domain).await.unwrap_err(),
                Error::InvalidDomain,
                "{}",
                domain
            );
        }
    }

    #[tokio::test]
    async fn spf_report_serializes_the_documented_shape() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add("example.com", "v=spf1 -all", valid_until);

        let report = resolver.spf_report("example.com").await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        for field in [
            "domain",
            "spfRecords",
            "validationResults",
            "scoringResults",
            "requestId",
            "responseTime",
            "timestamp",
        ] {
            assert!(json.get(field).is_some(), "{}", field);
        }
        assert_eq!(json["spfRecords"][0]["type"], "initial");
        assert_eq!(json["spfRecords"][0]["spfRecord"], "v=spf1 -all");
        assert_eq!(
            json["validationResults"]["firstAllQualifier"]["qualifier"],
            "-"
        );
        assert_eq!(
            json["validationResults"]["hasSpfRecord"]["isValid"],
            true
        );
        assert_eq!(json["scoringResults"]["grade"], "A");
        let item = &json["scoringResults"]["scoreItems"][0];
        for field in ["name", "description", "score", "maxScore", "passed", "details"] {
            assert!(item.get(field).is_some(), "{}", field);
        }
    }

    #[tokio::test]
    async fn security_report_serializes_the_documented_shape() {
        let (resolver, valid_until) = resolver();
        seed_healthy_domain(&resolver, valid_until);

        let report = resolver.security_report("example.com").await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        for field in [
            "domain",
            "scores",
            "totalScore",
            "maxPossibleScore",
            "percentage",
            "requestId",
            "responseTime",
            "timestamp",
        ] {
            assert!(json.get(field).is_some(), "{}", field);
        }
        for protocol in ["spf", "dkim", "dmarc"] {
            assert!(json["scores"].get(protocol).is_some(), "{}", protocol);
        }
    }

    #[tokio::test]
    async fn dkim_and_dmarc_reports_carry_their_records() {
        let (resolver, valid_until) = resolver();
        seed_healthy_domain(&resolver, valid_until);

        let dkim = resolver.dkim_report("example.com", None).await.unwrap();
        assert_eq!(dkim.records.len(), 1);
        let json = serde_json::to_value(&dkim).unwrap();
        assert_eq!(json["records"][0]["selector"], "default");
        assert_eq!(json["records"][0]["parsedData"]["keyType"], "rsa");

        let dmarc = resolver.dmarc_report("example.com").await.unwrap();
        let json = serde_json::to_value(&dmarc).unwrap();
        assert_eq!(json["record"]["parsedData"]["policy"], "reject");
        assert_eq!(json["record"]["parsedData"]["percentage"], 100);
        assert_eq!(
            json["record"]["parsedData"]["reportEmails"][0],
            "dmarc@example.com"
        );
    }

    #[tokio::test]
    async fn explicit_selectors_override_the_default_list() {
        let (resolver, valid_until) = resolver();
        resolver.txt_add(
            "mail2024._domainkey.example.com",
            format!("v=DKIM1; k=rsa; p={}", "A".repeat(392)).as_str(),
            valid_until,
        );

        let with_defaults = resolver.dkim_report("example.com", None).await.unwrap();
        assert!(with_defaults.records.is_empty());

        let selectors = vec!["mail2024".to_string()];
        let with_override = resolver
            .dkim_report("example.com", Some(&selectors))
            .await
            .unwrap();
        assert_eq!(with_override.records.len(), 1);
    }
}
