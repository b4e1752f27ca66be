//! Substantive audit: contradiction detection against case records and
//! citation verification.
//!
//! Case-record unavailability degrades the audit to a procedural-only
//! result instead of failing the pipeline; citation-lookup unavailability
//! marks the affected checks rather than dropping them.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;

use super::analyzers::{Analyzers, CaseRecords};
use super::StageFailure;
use crate::config::PipelinePolicies;
use crate::events::{EventKind, EventSink};
use crate::models::{AuditResult, CitationCheck, Contradiction, Relevance};
use crate::resilience::{guarded_call, BreakerRegistry, CallError, Dependency};

lazy_static! {
    /// Indian reporter citation shapes: "(2015) 3 SCC 300",
    /// "AIR 2019 SC 1234", "2021 SCC OnLine Bom 55".
    static ref CITATION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"\(\d{4}\)\s+\d+\s+SCC\s+\d+").expect("static citation pattern"),
        Regex::new(r"AIR\s+\d{4}\s+[A-Z][A-Za-z]*\s+\d+").expect("static citation pattern"),
        Regex::new(r"\d{4}\s+SCC\s+OnLine\s+[A-Za-z]+\s+\d+").expect("static citation pattern"),
    ];
}

/// Scan pleading text for citation strings, in order of appearance,
/// deduplicated.
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for pattern in CITATION_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            found.push((m.start(), m.as_str().to_string()));
        }
    }
    found.sort_by_key(|(start, _)| *start);

    let mut seen = std::collections::HashSet::new();
    found
        .into_iter()
        .filter(|(_, citation)| seen.insert(citation.clone()))
        .map(|(_, citation)| citation)
        .collect()
}

/// Run the audit stage over the extracted pleading text.
pub async fn run_audit(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    sink: &dyn EventSink,
    case_number: &str,
    pleading_text: &str,
) -> Result<AuditResult, StageFailure> {
    let records = fetch_records(analyzers, breakers, policies, sink, case_number).await?;

    let Some(records) = records else {
        sink.log_event(
            EventKind::AuditDegraded,
            "audit",
            &format!("case {case_number}: no case records; issuing procedural-only brief"),
        );
        return Ok(AuditResult {
            contradictions: Vec::new(),
            citations: Vec::new(),
            degraded: true,
            completed_at: Utc::now(),
        });
    };

    let (contradictions, citations) = tokio::join!(
        detect_contradictions(analyzers, breakers, policies, pleading_text, &records),
        verify_citations(analyzers, breakers, policies, sink, pleading_text),
    );

    Ok(AuditResult {
        contradictions: contradictions?,
        citations,
        degraded: false,
        completed_at: Utc::now(),
    })
}

/// Ok(None) covers every degradable outcome: the service reported no
/// records, exhausted its retries, or sat behind an open breaker.
async fn fetch_records(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    sink: &dyn EventSink,
    case_number: &str,
) -> Result<Option<CaseRecords>, StageFailure> {
    let breaker = breakers.breaker(Dependency::CaseRecords);
    let fetched = guarded_call(
        &breaker,
        &policies.retry,
        policies.timeouts.for_dependency(Dependency::CaseRecords),
        || analyzers.case_records.fetch(case_number),
    )
    .await;

    match fetched {
        Ok(records) => Ok(records),
        Err(CallError::Permanent { dependency, source }) => Err(StageFailure::Permanent {
            dependency,
            detail: source.to_string(),
        }),
        Err(e) => {
            sink.log_event(
                EventKind::AuditDegraded,
                "audit",
                &format!("case records unavailable ({e}); proceeding without them"),
            );
            Ok(None)
        }
    }
}

async fn detect_contradictions(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    pleading_text: &str,
    records: &CaseRecords,
) -> Result<Vec<Contradiction>, StageFailure> {
    let breaker = breakers.breaker(Dependency::ModelValidation);
    let contradictions = guarded_call(
        &breaker,
        &policies.retry,
        policies.timeouts.for_dependency(Dependency::ModelValidation),
        || analyzers.contradictions.detect(pleading_text, records),
    )
    .await?;
    Ok(contradictions)
}

/// Verify each citation found in the pleading. Lookup failures mark the
/// check unverified/unclear instead of failing the stage.
async fn verify_citations(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    sink: &dyn EventSink,
    pleading_text: &str,
) -> Vec<CitationCheck> {
    let breaker = breakers.breaker(Dependency::CitationLookup);
    let timeout = policies.timeouts.for_dependency(Dependency::CitationLookup);
    let mut checks = Vec::new();
    let mut degraded = 0usize;

    for citation in extract_citations(pleading_text) {
        let verdict = guarded_call(
            &breaker,
            &policies.retry,
            timeout,
            || analyzers.citations.verify(&citation),
        )
        .await;

        let check = match verdict {
            Ok(verdict) if verdict.verified => {
                let relevance = guarded_call(
                    &breaker,
                    &policies.retry,
                    timeout,
                    || {
                        analyzers
                            .citations
                            .assess_relevance(pleading_text, &citation, &verdict.summary)
                    },
                )
                .await
                .unwrap_or(Relevance::Unclear);
                CitationCheck {
                    citation: citation.clone(),
                    verified: true,
                    relevance,
                    summary: verdict.summary,
                }
            }
            Ok(verdict) => CitationCheck {
                citation: citation.clone(),
                verified: false,
                relevance: Relevance::NotRelevant,
                summary: verdict.summary,
            },
            Err(e) => {
                degraded += 1;
                CitationCheck {
                    citation: citation.clone(),
                    verified: false,
                    relevance: Relevance::Unclear,
                    summary: format!("verification unavailable: {e}"),
                }
            }
        };
        checks.push(check);
    }

    if degraded > 0 {
        sink.log_event(
            EventKind::AuditDegraded,
            "audit",
            &format!("{degraded} citation(s) could not be verified; marked unclear"),
        );
    }
    checks
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BreakerPolicy;
    use crate::events::MemoryEventSink;
    use crate::models::Severity;
    use crate::pipeline::mock::{self, MockBehavior, RecordsMode};

    fn breakers() -> BreakerRegistry {
        BreakerRegistry::new(BreakerPolicy::default(), Arc::new(MemoryEventSink::new()))
    }

    #[test]
    fn finds_citations_in_order_without_duplicates() {
        let text = "Reliance on (2015) 3 SCC 300 and AIR 2019 SC 1234; \
                    see also (2015) 3 SCC 300 and 2021 SCC OnLine Bom 55.";
        let citations = extract_citations(text);
        assert_eq!(
            citations,
            vec![
                "(2015) 3 SCC 300".to_string(),
                "AIR 2019 SC 1234".to_string(),
                "2021 SCC OnLine Bom 55".to_string(),
            ]
        );
    }

    #[test]
    fn no_citations_in_plain_text() {
        assert!(extract_citations("the defendant denies all averments").is_empty());
    }

    #[tokio::test]
    async fn full_audit_with_contradiction() {
        let analyzers = mock::analyzers(MockBehavior {
            contradictions: vec![Contradiction {
                pleading_statement: "incident occurred on 12 March".into(),
                conflicting_statement: "FIR records 14 March".into(),
                source_document: "FIR 112/2025".into(),
                severity: Severity::Medium,
            }],
            ..Default::default()
        });
        let sink = MemoryEventSink::new();

        let result = run_audit(
            &analyzers,
            &breakers(),
            &mock::fast_policies(),
            &sink,
            "CRL-2026-0042",
            mock::CLEAN_PLEADING,
        )
        .await
        .unwrap();

        assert!(!result.degraded);
        assert_eq!(result.contradictions.len(), 1);
        assert_eq!(result.citations.len(), 1);
        assert!(result.citations[0].is_valid());
    }

    #[tokio::test]
    async fn records_down_degrades_to_procedural_only() {
        let (analyzers, hub) = mock::analyzers_with_hub(MockBehavior {
            records: RecordsMode::Down,
            ..Default::default()
        });
        let sink = MemoryEventSink::new();

        let result = run_audit(
            &analyzers,
            &breakers(),
            &mock::fast_policies(),
            &sink,
            "CRL-2026-0042",
            mock::CLEAN_PLEADING,
        )
        .await
        .unwrap();

        assert!(result.degraded);
        assert!(result.contradictions.is_empty());
        assert!(result.citations.is_empty());
        // Substantive analyzers never ran.
        assert_eq!(hub.detect_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(hub.citation_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!sink.events_of_kind(EventKind::AuditDegraded).is_empty());
    }

    #[tokio::test]
    async fn empty_records_also_degrade() {
        let analyzers = mock::analyzers(MockBehavior {
            records: RecordsMode::Empty,
            ..Default::default()
        });
        let sink = MemoryEventSink::new();

        let result = run_audit(
            &analyzers,
            &breakers(),
            &mock::fast_policies(),
            &sink,
            "CRL-2026-0042",
            mock::CLEAN_PLEADING,
        )
        .await
        .unwrap();
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn citation_lookup_down_marks_checks_unclear() {
        let analyzers = mock::analyzers(MockBehavior {
            citations_down: true,
            ..Default::default()
        });
        let sink = MemoryEventSink::new();

        let result = run_audit(
            &analyzers,
            &breakers(),
            &mock::fast_policies(),
            &sink,
            "CRL-2026-0042",
            mock::CLEAN_PLEADING,
        )
        .await
        .unwrap();

        assert!(!result.degraded);
        assert_eq!(result.citations.len(), 1);
        assert!(!result.citations[0].verified);
        assert_eq!(result.citations[0].relevance, Relevance::Unclear);
        assert_eq!(sink.events_of_kind(EventKind::AuditDegraded).len(), 1);
    }

    #[tokio::test]
    async fn contradiction_detector_exhaustion_fails_the_stage() {
        let analyzers = mock::analyzers(MockBehavior {
            detect_transient_failures: u32::MAX,
            ..Default::default()
        });
        let sink = MemoryEventSink::new();

        let result = run_audit(
            &analyzers,
            &breakers(),
            &mock::fast_policies(),
            &sink,
            "CRL-2026-0042",
            mock::CLEAN_PLEADING,
        )
        .await;
        assert!(matches!(result, Err(StageFailure::Exhausted { .. })));
    }
}
