use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentKind;

/// The exact metadata snapshot folded into a filing's digest.
///
/// Field order here is the canonical serialization order; changing it
/// changes every digest, so treat it as a wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashMetadata {
    pub case_number: String,
    pub document_kind: DocumentKind,
    pub filed_at: DateTime<Utc>,
    pub filer_id: String,
}

/// A filing's digest plus the metadata that produced it. Immutable once
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRecord {
    pub filing_id: Uuid,
    pub digest: String,
    pub metadata: HashMetadata,
    pub created_at: DateTime<Utc>,
}

/// A committed ledger position: a HashRecord with its globally monotonic
/// sequence number and write-time transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: i64,
    pub txn_id: Uuid,
    pub record: HashRecord,
}

/// Raised when a recomputed digest disagrees with the ledger. Once set,
/// the filing is unusable for proceedings until an explicit manual
/// clearance is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperFlag {
    pub filing_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub expected_digest: String,
    pub observed_digest: String,
    /// Who triggered the recomputation that exposed the mismatch.
    pub actor: String,
}
