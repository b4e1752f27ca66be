use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentKind, FilerRole, FilingFormat, FilingState};

/// Who submitted the filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilerInfo {
    pub id: String,
    pub name: String,
    pub role: FilerRole,
}

/// A submitted court filing under scrutiny.
///
/// Content is immutable once hashed; the only mutations after ingestion are
/// the pipeline state and the append-only stage results (held as durable
/// stage markers, not on this struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    pub id: Uuid,
    pub case_number: String,
    pub document_kind: DocumentKind,
    pub filer: FilerInfo,
    /// BCP-47-ish language tag for remediation guides, e.g. "hi".
    pub preferred_language: String,
    /// Format named by the submitter. Recorded, but detection trusts
    /// magic bytes.
    pub declared_format: String,
    pub detected_format: FilingFormat,
    /// Reference into the external blob store.
    pub content_ref: String,
    /// Content digest computed at intake; used for duplicate detection.
    pub content_sha256: String,
    pub state: FilingState,
    pub submitted_at: DateTime<Utc>,
}

/// Submission payload before ingestion assigns an id and stores content.
#[derive(Debug, Clone)]
pub struct NewFiling {
    pub case_number: String,
    pub document_kind: DocumentKind,
    pub filer: FilerInfo,
    pub preferred_language: String,
    pub declared_format: String,
    pub content: Vec<u8>,
}
