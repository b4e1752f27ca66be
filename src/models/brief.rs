use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Relevance, Severity};

/// A pleading statement that conflicts with the case record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub pleading_statement: String,
    pub conflicting_statement: String,
    /// Reference to the source document (FIR number, deposition id).
    pub source_document: String,
    pub severity: Severity,
}

/// Verification result for one citation found in the filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationCheck {
    pub citation: String,
    pub verified: bool,
    pub relevance: Relevance,
    pub summary: String,
}

impl CitationCheck {
    /// Counts toward case-law validity only when the citation both exists
    /// and supports the argument.
    pub fn is_valid(&self) -> bool {
        self.verified && self.relevance == Relevance::Relevant
    }
}

/// Aggregated procedural + substantive analysis for one filing.
///
/// `priority_rank` is assigned only in the context of a ranked set; a
/// freshly generated brief carries `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearingBrief {
    pub filing_id: Uuid,
    pub case_number: String,
    pub procedurally_compliant: bool,
    pub contradictions: Vec<Contradiction>,
    pub citations: Vec<CitationCheck>,
    /// Case records were unavailable; substantive sections are empty and
    /// the score reflects procedural compliance only.
    pub degraded: bool,
    /// Trial readiness in [0,1].
    pub trial_readiness: f64,
    pub priority_rank: Option<u32>,
    /// Submission time of the underlying filing; ranking tie-breaker.
    pub filed_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}
