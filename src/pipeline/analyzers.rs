//! Collaborator seams.
//!
//! Every external analyzer the pipeline depends on sits behind one of
//! these traits so the coordinator stays fully testable with mock
//! implementations, and so breaker/retry policy wraps the seam rather
//! than any concrete client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CheckOutcome, Contradiction, Filing, Relevance};
use crate::resilience::{FailureKind, Retryable};

/// Failure taxonomy for analyzer calls: transient failures enter the
/// retry/breaker path, permanent ones propagate immediately.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("call timed out")]
    Timeout,

    #[error("throttled by dependency")]
    Throttled,

    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from dependency: {0}")]
    InvalidResponse(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl Retryable for AnalyzerError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout | Self::Throttled | Self::Unavailable(_) | Self::InvalidResponse(_) => {
                FailureKind::Transient
            }
            Self::MalformedInput(_) => FailureKind::Permanent,
        }
    }

    fn timed_out() -> Self {
        Self::Timeout
    }
}

// ═══════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub rows: Vec<Vec<String>>,
}

/// Text and structure pulled out of the submitted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedStructure {
    pub text: String,
    pub form_fields: HashMap<String, String>,
    pub tables: Vec<ExtractedTable>,
}

/// The four procedural checks as returned by the validation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFindings {
    pub signatures: CheckOutcome,
    pub court_fees: CheckOutcome,
    pub jurisdiction: CheckOutcome,
    pub annexures: CheckOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecordDoc {
    /// FIR number, deposition id, or similar registry reference.
    pub reference: String,
    pub text: String,
}

/// Case history fetched for substantive audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseRecords {
    pub firs: Vec<CaseRecordDoc>,
    pub depositions: Vec<CaseRecordDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationVerdict {
    pub verified: bool,
    pub summary: String,
}

// ═══════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════

#[async_trait]
pub trait StructureExtractor: Send + Sync {
    async fn extract(&self, content: &[u8]) -> Result<ExtractedStructure, AnalyzerError>;
}

#[async_trait]
pub trait ComplianceValidator: Send + Sync {
    async fn validate(
        &self,
        text: &str,
        structure: &ExtractedStructure,
    ) -> Result<ComplianceFindings, AnalyzerError>;
}

/// Translation failures never propagate out of the pipeline; callers fall
/// back to the untranslated text.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, AnalyzerError>;
}

#[async_trait]
pub trait CaseRecordFetcher: Send + Sync {
    /// Ok(None) means the record service answered but has nothing for
    /// this case; the audit proceeds procedurally.
    async fn fetch(&self, case_number: &str) -> Result<Option<CaseRecords>, AnalyzerError>;
}

#[async_trait]
pub trait ContradictionDetector: Send + Sync {
    async fn detect(
        &self,
        pleading_text: &str,
        records: &CaseRecords,
    ) -> Result<Vec<Contradiction>, AnalyzerError>;
}

#[async_trait]
pub trait CitationVerifier: Send + Sync {
    async fn verify(&self, citation: &str) -> Result<CitationVerdict, AnalyzerError>;

    async fn assess_relevance(
        &self,
        argument_context: &str,
        citation: &str,
        summary: &str,
    ) -> Result<Relevance, AnalyzerError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn persist(&self, filing_id: Uuid, content: &[u8]) -> Result<String, AnalyzerError>;

    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, AnalyzerError>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn persist(&self, filing: &Filing) -> Result<(), AnalyzerError>;
}

/// The full collaborator bundle injected into the coordinator.
#[derive(Clone)]
pub struct Analyzers {
    pub extractor: Arc<dyn StructureExtractor>,
    pub validator: Arc<dyn ComplianceValidator>,
    pub translator: Arc<dyn Translator>,
    pub case_records: Arc<dyn CaseRecordFetcher>,
    pub contradictions: Arc<dyn ContradictionDetector>,
    pub citations: Arc<dyn CitationVerifier>,
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
}
