pub mod breaker;
pub mod retry;

pub use breaker::*;
pub use retry::*;

use serde::{Deserialize, Serialize};

/// External dependencies the pipeline calls through a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    StructureExtraction,
    /// Compliance validation and contradiction detection share the same
    /// model-backed service.
    ModelValidation,
    Translation,
    CaseRecords,
    CitationLookup,
}

impl Dependency {
    pub const ALL: [Dependency; 5] = [
        Dependency::StructureExtraction,
        Dependency::ModelValidation,
        Dependency::Translation,
        Dependency::CaseRecords,
        Dependency::CitationLookup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructureExtraction => "structure_extraction",
            Self::ModelValidation => "model_validation",
            Self::Translation => "translation",
            Self::CaseRecords => "case_records",
            Self::CitationLookup => "citation_lookup",
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy driving retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, throttling, unavailability: retried with backoff.
    Transient,
    /// Validation/format errors: propagate immediately, no retry.
    Permanent,
}

/// Errors the retry layer can classify and synthesize.
pub trait Retryable: std::error::Error {
    fn failure_kind(&self) -> FailureKind;
    /// The error representing an exceeded call bound.
    fn timed_out() -> Self;
}
