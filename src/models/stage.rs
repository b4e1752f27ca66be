//! Stage results: a sealed variant set so the coordinator's transition
//! logic can match exhaustively and every result serializes into its
//! durable stage marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::brief::{CitationCheck, Contradiction};

/// One procedural check: pass/fail plus free-text detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Outcome of procedural scrutiny: four named checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrutinyResult {
    pub signatures: CheckOutcome,
    pub court_fees: CheckOutcome,
    pub jurisdiction: CheckOutcome,
    pub annexures: CheckOutcome,
    pub completed_at: DateTime<Utc>,
}

impl ScrutinyResult {
    /// Compliant iff all four checks pass.
    pub fn compliant(&self) -> bool {
        self.checks().iter().all(|(_, c)| c.passed)
    }

    /// Failing-check descriptions, in check order. Empty iff compliant.
    pub fn defects(&self) -> Vec<String> {
        self.checks()
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(_, c)| c.detail.clone())
            .collect()
    }

    fn checks(&self) -> [(&'static str, &CheckOutcome); 4] {
        [
            ("signatures", &self.signatures),
            ("court_fees", &self.court_fees),
            ("jurisdiction", &self.jurisdiction),
            ("annexures", &self.annexures),
        ]
    }
}

/// Outcome of the integrity stage: the committed ledger position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub sequence: i64,
    pub txn_id: Uuid,
    pub digest: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of the audit stage.
///
/// `degraded` marks a procedural-only brief: case records were unavailable,
/// so no substantive analysis ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub contradictions: Vec<Contradiction>,
    pub citations: Vec<CitationCheck>,
    pub degraded: bool,
    pub completed_at: DateTime<Utc>,
}

/// Remediation guide for a defective filing: the defect list plus
/// correction instructions, translated to the filer's preferred language
/// where the translator allowed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationGuide {
    pub language: String,
    /// (original, rendered) per defect; rendered falls back to a
    /// pending-translation placeholder when translation failed.
    pub items: Vec<RemediationItem>,
    pub translated: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationItem {
    pub defect: String,
    pub instruction: String,
    pub rendered: String,
}

/// Tagged union over the per-stage payloads. Append-only per filing;
/// never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResult {
    Scrutiny(ScrutinyResult),
    Integrity(IntegrityResult),
    Audit(AuditResult),
}

impl StageResult {
    /// Marker key for the durable stage-completion table.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Scrutiny(_) => "scrutiny",
            Self::Integrity(_) => "integrity",
            Self::Audit(_) => "audit",
        }
    }
}
