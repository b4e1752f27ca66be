//! Procedural scrutiny: structure extraction followed by the four
//! compliance checks.

use chrono::Utc;

use super::analyzers::{Analyzers, ExtractedStructure};
use super::StageFailure;
use crate::config::PipelinePolicies;
use crate::models::ScrutinyResult;
use crate::resilience::{guarded_call, BreakerRegistry, Dependency};

/// Pull text and structure out of the document.
pub async fn run_extraction(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    content: &[u8],
) -> Result<ExtractedStructure, StageFailure> {
    let breaker = breakers.breaker(Dependency::StructureExtraction);
    let structure = guarded_call(
        &breaker,
        &policies.retry,
        policies.timeouts.for_dependency(Dependency::StructureExtraction),
        || analyzers.extractor.extract(content),
    )
    .await?;
    Ok(structure)
}

/// Run the four procedural checks against the extracted document.
pub async fn run_validation(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    structure: &ExtractedStructure,
) -> Result<ScrutinyResult, StageFailure> {
    let breaker = breakers.breaker(Dependency::ModelValidation);
    let findings = guarded_call(
        &breaker,
        &policies.retry,
        policies.timeouts.for_dependency(Dependency::ModelValidation),
        || analyzers.validator.validate(&structure.text, structure),
    )
    .await?;

    Ok(ScrutinyResult {
        signatures: findings.signatures,
        court_fees: findings.court_fees,
        jurisdiction: findings.jurisdiction,
        annexures: findings.annexures,
        completed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BreakerPolicy;
    use crate::events::MemoryEventSink;
    use crate::pipeline::mock::{self, MockBehavior};

    fn policies() -> PipelinePolicies {
        mock::fast_policies()
    }

    #[tokio::test]
    async fn clean_document_passes_all_checks() {
        let analyzers = mock::analyzers(MockBehavior::default());
        let breakers = BreakerRegistry::new(
            BreakerPolicy::default(),
            Arc::new(MemoryEventSink::new()),
        );
        let policies = policies();

        let structure =
            run_extraction(&analyzers, &breakers, &policies, mock::CLEAN_PLEADING.as_bytes())
                .await
                .unwrap();
        let result = run_validation(&analyzers, &breakers, &policies, &structure)
            .await
            .unwrap();
        assert!(result.compliant());
        assert!(result.defects().is_empty());
    }

    #[tokio::test]
    async fn missing_fee_and_signature_reported_in_order() {
        let analyzers = mock::analyzers(MockBehavior::default());
        let breakers = BreakerRegistry::new(
            BreakerPolicy::default(),
            Arc::new(MemoryEventSink::new()),
        );
        let policies = policies();

        // Pleading text lacking both the signature block and fee schedule.
        let text = "jurisdiction of this court is made out; annexure index attached";
        let structure = ExtractedStructure {
            text: text.into(),
            ..Default::default()
        };
        let result = run_validation(&analyzers, &breakers, &policies, &structure)
            .await
            .unwrap();

        assert!(!result.compliant());
        let defects = result.defects();
        assert_eq!(defects.len(), 2);
        assert_eq!(defects[0], "Digital Signature placeholder not detected");
        assert_eq!(defects[1], "Court Fee calculation not found");
    }
}
