pub mod analyzers;
pub mod intake;
pub mod scrutiny;
pub mod remediation;
pub mod audit;
pub mod scoring;
pub mod coordinator;

#[cfg(test)]
pub(crate) mod mock;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::integrity::LedgerError;
use crate::resilience::{CallError, Dependency};

use analyzers::AnalyzerError;

/// Why a stage could not produce a result.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// Transient failures outlasted the retry budget; the filing goes to
    /// manual review.
    #[error("{dependency} failed after retries: {detail}")]
    Exhausted {
        dependency: Dependency,
        detail: String,
    },

    /// The breaker was open and the dependency has no fallback for this
    /// stage; the filing goes to manual review.
    #[error("{dependency} unavailable (circuit open)")]
    ShortCircuited { dependency: Dependency },

    /// Unrecoverable permanent error; the filing fails.
    #[error("{dependency} rejected the filing: {detail}")]
    Permanent {
        dependency: Dependency,
        detail: String,
    },
}

impl From<CallError<AnalyzerError>> for StageFailure {
    fn from(e: CallError<AnalyzerError>) -> Self {
        match e {
            CallError::ShortCircuited { dependency } => Self::ShortCircuited { dependency },
            CallError::Exhausted { dependency, source } => Self::Exhausted {
                dependency,
                detail: source.to_string(),
            },
            CallError::Permanent { dependency, source } => Self::Permanent {
                dependency,
                detail: source.to_string(),
            },
        }
    }
}

/// Coordinator-level failures: the orchestration store or ledger itself,
/// not a stage outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("filing not found: {0}")]
    FilingNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("blob storage unavailable: {0}")]
    Storage(String),
}
