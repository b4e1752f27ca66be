//! Trial-readiness scoring and priority ranking.
//!
//! Pure functions of their inputs: no clock, no store, no hidden state.

use std::cmp::Ordering;

use chrono::Utc;

use crate::config::ScoringPolicy;
use crate::models::{
    AuditResult, CitationCheck, Contradiction, Filing, HearingBrief, ScrutinyResult,
};

/// 1 − (severity-weighted contradiction penalty), floored at 0.
pub fn factual_consistency(contradictions: &[Contradiction], policy: &ScoringPolicy) -> f64 {
    let penalty: f64 = contradictions
        .iter()
        .map(|c| policy.severity_penalty(c.severity))
        .sum();
    1.0 - penalty.min(1.0)
}

/// Fraction of citations that are verified and relevant. No citations
/// means nothing to invalidate: 1.0.
pub fn case_law_validity(citations: &[CitationCheck]) -> f64 {
    if citations.is_empty() {
        return 1.0;
    }
    let valid = citations.iter().filter(|c| c.is_valid()).count();
    valid as f64 / citations.len() as f64
}

/// Weighted composite, clamped to [0,1]. A degraded audit contributes
/// only the procedural term: an unaudited filing must not outrank
/// audited ones.
pub fn trial_readiness(compliant: bool, audit: &AuditResult, policy: &ScoringPolicy) -> f64 {
    let procedural = if compliant { 1.0 } else { 0.0 };
    let score = if audit.degraded {
        policy.w_procedural * procedural
    } else {
        policy.w_procedural * procedural
            + policy.w_factual * factual_consistency(&audit.contradictions, policy)
            + policy.w_caselaw * case_law_validity(&audit.citations)
    };
    score.clamp(0.0, 1.0)
}

/// Assemble the brief for a filing that completed its audit.
pub fn assemble_brief(
    filing: &Filing,
    scrutiny: &ScrutinyResult,
    audit: AuditResult,
    policy: &ScoringPolicy,
) -> HearingBrief {
    let compliant = scrutiny.compliant();
    let score = trial_readiness(compliant, &audit, policy);
    HearingBrief {
        filing_id: filing.id,
        case_number: filing.case_number.clone(),
        procedurally_compliant: compliant,
        contradictions: audit.contradictions,
        citations: audit.citations,
        degraded: audit.degraded,
        trial_readiness: score,
        priority_rank: None,
        filed_at: filing.submitted_at,
        generated_at: Utc::now(),
    }
}

/// Stable descending sort by score, ties broken by earliest filing (older
/// first, so long-waiting cases cannot starve). Assigns 1-based ranks.
pub fn rank(mut briefs: Vec<HearingBrief>) -> Vec<HearingBrief> {
    briefs.sort_by(|a, b| {
        b.trial_readiness
            .partial_cmp(&a.trial_readiness)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.filed_at.cmp(&b.filed_at))
    });
    for (position, brief) in briefs.iter_mut().enumerate() {
        brief.priority_rank = Some(position as u32 + 1);
    }
    briefs
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
