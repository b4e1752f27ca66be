//! Remediation guides for defective filings.
//!
//! Defect list plus correction instructions, rendered in the filer's
//! preferred language. Translation failure never blocks the guide: the
//! item falls back to a pending-translation placeholder and the fallback
//! is recorded.

use chrono::Utc;

use super::analyzers::Analyzers;
use crate::config::PipelinePolicies;
use crate::events::{EventKind, EventSink};
use crate::models::{RemediationGuide, RemediationItem};
use crate::resilience::{guarded_call, BreakerRegistry, Dependency};

/// Source language of scrutiny output.
const SOURCE_LANGUAGE: &str = "en";

/// Map a defect description to a correction instruction.
pub fn correction_instruction(defect: &str) -> String {
    let lower = defect.to_lowercase();
    if lower.contains("signature") {
        "Affix the advocate's digital signature at the marked placeholder and re-upload.".into()
    } else if lower.contains("court fee") {
        "Attach the court fee computation sheet with the paid challan reference.".into()
    } else if lower.contains("jurisdiction") {
        "State the grounds on which this court holds territorial jurisdiction.".into()
    } else if lower.contains("annexure") {
        "Attach the annexure index and every annexure referenced in the pleading.".into()
    } else {
        "Correct the noted defect and refile.".into()
    }
}

/// Build the guide, translating each item to `language`.
pub async fn build_guide(
    analyzers: &Analyzers,
    breakers: &BreakerRegistry,
    policies: &PipelinePolicies,
    sink: &dyn EventSink,
    defects: &[String],
    language: &str,
) -> RemediationGuide {
    let mut items = Vec::with_capacity(defects.len());
    let mut fallbacks = 0usize;

    for defect in defects {
        let instruction = correction_instruction(defect);
        let text = format!("{defect}. {instruction}");

        let rendered = if language == SOURCE_LANGUAGE {
            text
        } else {
            let breaker = breakers.breaker(Dependency::Translation);
            let translated = guarded_call(
                &breaker,
                &policies.retry,
                policies.timeouts.for_dependency(Dependency::Translation),
                || analyzers.translator.translate(&text, language),
            )
            .await;
            match translated {
                Ok(rendered) => rendered,
                Err(e) => {
                    fallbacks += 1;
                    sink.log_event(
                        EventKind::TranslationFallback,
                        "remediation",
                        &format!("falling back to untranslated guide item: {e}"),
                    );
                    format!("[Translation pending: {text}]")
                }
            }
        };

        items.push(RemediationItem {
            defect: defect.clone(),
            instruction,
            rendered,
        });
    }

    RemediationGuide {
        language: language.to_string(),
        items,
        translated: fallbacks == 0,
        generated_at: Utc::now(),
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
