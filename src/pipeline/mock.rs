//! Mock analyzers for coordinator and stage tests.
//!
//! One hub implements every collaborator trait with scriptable failure
//! injection and call counters, so tests can assert at-most-once behavior
//! across re-entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::analyzers::*;
use crate::config::{PipelinePolicies, RetryPolicy};
use crate::models::{CheckOutcome, Contradiction, Filing, Relevance};

/// A pleading that passes all four gatekeeper checks and cites one case.
pub(crate) const CLEAN_PLEADING: &str = "%PDF-1.7\n\
    IN THE COURT OF THE SESSIONS JUDGE, PUNE\n\
    Digital Signature of counsel affixed. Court Fee of Rs. 500 computed per schedule.\n\
    The jurisdiction of this Hon'ble Court arises at Pune. Annexure index: A-1 to A-4.\n\
    Reliance is placed on (2015) 3 SCC 300.\n";

/// Policies with millisecond backoff so exhaustion paths stay fast.
pub(crate) fn fast_policies() -> PipelinePolicies {
    PipelinePolicies {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 2.0,
        },
        ..Default::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordsMode {
    /// One FIR on file.
    Available,
    /// The record service answers but holds nothing for the case.
    Empty,
    /// Every fetch fails transiently.
    Down,
}

pub(crate) struct MockBehavior {
    pub extract_transient_failures: u32,
    pub extract_permanent: bool,
    pub validate_transient_failures: u32,
    pub translate_fails: bool,
    pub records: RecordsMode,
    pub detect_transient_failures: u32,
    pub contradictions: Vec<Contradiction>,
    pub citations_down: bool,
    pub relevance: Relevance,
    pub blob_fetch_failures: u32,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            extract_transient_failures: 0,
            extract_permanent: false,
            validate_transient_failures: 0,
            translate_fails: false,
            records: RecordsMode::Available,
            detect_transient_failures: 0,
            contradictions: Vec::new(),
            citations_down: false,
            relevance: Relevance::Relevant,
            blob_fetch_failures: 0,
        }
    }
}

pub(crate) struct MockHub {
    behavior: MockBehavior,
    extract_left: AtomicU32,
    validate_left: AtomicU32,
    detect_left: AtomicU32,
    blob_left: AtomicU32,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub extract_calls: AtomicU32,
    pub validate_calls: AtomicU32,
    pub translate_calls: AtomicU32,
    pub records_calls: AtomicU32,
    pub detect_calls: AtomicU32,
    pub citation_calls: AtomicU32,
    pub metadata_calls: AtomicU32,
}

impl MockHub {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            extract_left: AtomicU32::new(behavior.extract_transient_failures),
            validate_left: AtomicU32::new(behavior.validate_transient_failures),
            detect_left: AtomicU32::new(behavior.detect_transient_failures),
            blob_left: AtomicU32::new(behavior.blob_fetch_failures),
            behavior,
            blobs: Mutex::new(HashMap::new()),
            extract_calls: AtomicU32::new(0),
            validate_calls: AtomicU32::new(0),
            translate_calls: AtomicU32::new(0),
            records_calls: AtomicU32::new(0),
            detect_calls: AtomicU32::new(0),
            citation_calls: AtomicU32::new(0),
            metadata_calls: AtomicU32::new(0),
        })
    }

    fn countdown(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Overwrite a stored blob, simulating content tampered after the
    /// ledger commit.
    pub fn tamper_blob(&self, content_ref: &str, bytes: &[u8]) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(content_ref.to_string(), bytes.to_vec());
        }
    }

    fn keyword_check(text: &str, keyword: &str, pass: &str, fail: &str) -> CheckOutcome {
        if text.to_lowercase().contains(keyword) {
            CheckOutcome::pass(pass)
        } else {
            CheckOutcome::fail(fail)
        }
    }
}

#[async_trait]
impl StructureExtractor for MockHub {
    async fn extract(&self, content: &[u8]) -> Result<ExtractedStructure, AnalyzerError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.extract_permanent {
            return Err(AnalyzerError::MalformedInput("unreadable document".into()));
        }
        if Self::countdown(&self.extract_left) {
            return Err(AnalyzerError::Unavailable("extractor 503".into()));
        }
        Ok(ExtractedStructure {
            text: String::from_utf8_lossy(content).to_string(),
            form_fields: HashMap::new(),
            tables: Vec::new(),
        })
    }
}

#[async_trait]
impl ComplianceValidator for MockHub {
    async fn validate(
        &self,
        text: &str,
        _structure: &ExtractedStructure,
    ) -> Result<ComplianceFindings, AnalyzerError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if Self::countdown(&self.validate_left) {
            return Err(AnalyzerError::Throttled);
        }
        Ok(ComplianceFindings {
            signatures: Self::keyword_check(
                text,
                "signature",
                "digital signature block present",
                "Digital Signature placeholder not detected",
            ),
            court_fees: Self::keyword_check(
                text,
                "court fee",
                "court fee computation attached",
                "Court Fee calculation not found",
            ),
            jurisdiction: Self::keyword_check(
                text,
                "jurisdiction",
                "jurisdiction statement present",
                "Jurisdiction statement missing",
            ),
            annexures: Self::keyword_check(
                text,
                "annexure",
                "annexure index complete",
                "Annexure index missing",
            ),
        })
    }
}

#[async_trait]
impl Translator for MockHub {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, AnalyzerError> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.translate_fails {
            return Err(AnalyzerError::Unavailable("translation service down".into()));
        }
        Ok(format!("[{target_lang}] {text}"))
    }
}

#[async_trait]
impl CaseRecordFetcher for MockHub {
    async fn fetch(&self, _case_number: &str) -> Result<Option<CaseRecords>, AnalyzerError> {
        self.records_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior.records {
            RecordsMode::Down => Err(AnalyzerError::Unavailable("records service 503".into())),
            RecordsMode::Empty => Ok(None),
            RecordsMode::Available => Ok(Some(CaseRecords {
                firs: vec![CaseRecordDoc {
                    reference: "FIR 112/2025".into(),
                    text: "Complainant reported the incident on 14 March.".into(),
                }],
                depositions: Vec::new(),
            })),
        }
    }
}

#[async_trait]
impl ContradictionDetector for MockHub {
    async fn detect(
        &self,
        _pleading_text: &str,
        _records: &CaseRecords,
    ) -> Result<Vec<Contradiction>, AnalyzerError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if Self::countdown(&self.detect_left) {
            return Err(AnalyzerError::Timeout);
        }
        Ok(self.behavior.contradictions.clone())
    }
}

#[async_trait]
impl CitationVerifier for MockHub {
    async fn verify(&self, citation: &str) -> Result<CitationVerdict, AnalyzerError> {
        self.citation_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.citations_down {
            return Err(AnalyzerError::Unavailable("citation index down".into()));
        }
        Ok(CitationVerdict {
            verified: true,
            summary: format!("{citation} located in the reporter"),
        })
    }

    async fn assess_relevance(
        &self,
        _argument_context: &str,
        _citation: &str,
        _summary: &str,
    ) -> Result<Relevance, AnalyzerError> {
        if self.behavior.citations_down {
            return Err(AnalyzerError::Unavailable("citation index down".into()));
        }
        Ok(self.behavior.relevance)
    }
}

#[async_trait]
impl BlobStore for MockHub {
    async fn persist(&self, filing_id: Uuid, content: &[u8]) -> Result<String, AnalyzerError> {
        let content_ref = format!("blob://filings/{filing_id}");
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(content_ref.clone(), content.to_vec());
        }
        Ok(content_ref)
    }

    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, AnalyzerError> {
        if Self::countdown(&self.blob_left) {
            return Err(AnalyzerError::Unavailable("blob store 503".into()));
        }
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(content_ref).cloned())
            .ok_or_else(|| AnalyzerError::Unavailable(format!("missing blob {content_ref}")))
    }
}

#[async_trait]
impl MetadataStore for MockHub {
    async fn persist(&self, _filing: &Filing) -> Result<(), AnalyzerError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Build an `Analyzers` bundle plus the hub for call-count assertions.
pub(crate) fn analyzers_with_hub(behavior: MockBehavior) -> (Analyzers, Arc<MockHub>) {
    let hub = MockHub::new(behavior);
    let analyzers = Analyzers {
        extractor: hub.clone(),
        validator: hub.clone(),
        translator: hub.clone(),
        case_records: hub.clone(),
        contradictions: hub.clone(),
        citations: hub.clone(),
        blobs: hub.clone(),
        metadata: hub.clone(),
    };
    (analyzers, hub)
}

pub(crate) fn analyzers(behavior: MockBehavior) -> Analyzers {
    analyzers_with_hub(behavior).0
}
