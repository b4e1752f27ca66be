//! Submission gate: format sniffing, size cap, duplicate detection.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::config::MAX_SUBMISSION_BYTES;
use crate::db::{repository, DatabaseError};
use crate::integrity::content_digest;
use crate::models::{FilingFormat, NewFiling};

/// Detect file format from magic bytes (NOT the declared format).
/// Magic bytes don't lie — declarations can be wrong.
pub fn detect_format(content: &[u8]) -> Option<FilingFormat> {
    match content {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(FilingFormat::Pdf),
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(FilingFormat::Jpeg),
        // PNG: 89 P N G \r \n 0x1A \n
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(FilingFormat::Png),
        // TIFF: little-endian II*\0 or big-endian MM\0*
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(FilingFormat::Tiff),
        _ => None,
    }
}

/// Outcome of intake evaluation, before any storage side effect.
#[derive(Debug, Clone, Serialize)]
pub enum IntakeDecision {
    Admit {
        detected_format: FilingFormat,
        content_sha256: String,
    },
    /// Byte-identical document already filed for this case.
    Duplicate { existing: Uuid },
    Rejected { reason: String },
}

/// Evaluate a submission against the format allow-list, the size cap,
/// and prior filings for the same case.
pub fn evaluate(conn: &Connection, new: &NewFiling) -> Result<IntakeDecision, DatabaseError> {
    if new.content.len() as u64 > MAX_SUBMISSION_BYTES {
        return Ok(IntakeDecision::Rejected {
            reason: format!(
                "document exceeds the {}MB submission limit",
                MAX_SUBMISSION_BYTES / (1024 * 1024)
            ),
        });
    }

    let Some(detected_format) = detect_format(&new.content) else {
        return Ok(IntakeDecision::Rejected {
            reason: format!(
                "unsupported format {:?}; accepted formats are PDF, JPEG, PNG, TIFF",
                new.declared_format
            ),
        });
    };

    let content_sha256 = content_digest(&new.content);
    if let Some(existing) = repository::find_duplicate(conn, &new.case_number, &content_sha256)? {
        return Ok(IntakeDecision::Duplicate { existing });
    }

    Ok(IntakeDecision::Admit {
        detected_format,
        content_sha256,
    })
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::open_memory_database;
    use crate::models::*;

    const PDF: &[u8] = b"%PDF-1.7 minimal";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
    const TIFF_LE: &[u8] = &[0x49, 0x49, 0x2A, 0x00, 0x08];
    const TIFF_BE: &[u8] = &[0x4D, 0x4D, 0x00, 0x2A, 0x08];

    fn submission(content: &[u8]) -> NewFiling {
        NewFiling {
            case_number: "CRL-2026-0042".into(),
            document_kind: DocumentKind::Plaint,
            filer: FilerInfo {
                id: "ADV-119".into(),
                name: "R. Sharma".into(),
                role: FilerRole::Advocate,
            },
            preferred_language: "hi".into(),
            declared_format: "pdf".into(),
            content: content.to_vec(),
        }
    }

    #[test]
    fn all_supported_formats_detected() {
        assert_eq!(detect_format(PDF), Some(FilingFormat::Pdf));
        assert_eq!(detect_format(JPEG), Some(FilingFormat::Jpeg));
        assert_eq!(detect_format(PNG), Some(FilingFormat::Png));
        assert_eq!(detect_format(TIFF_LE), Some(FilingFormat::Tiff));
        assert_eq!(detect_format(TIFF_BE), Some(FilingFormat::Tiff));
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        assert_eq!(detect_format(b"PK\x03\x04 zip archive"), None);
        assert_eq!(detect_format(b"plain text pleading"), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn supported_submissions_admitted() {
        let conn = open_memory_database().unwrap();
        for content in [PDF, JPEG, PNG, TIFF_LE, TIFF_BE] {
            let decision = evaluate(&conn, &submission(content)).unwrap();
            assert!(matches!(decision, IntakeDecision::Admit { .. }));
        }
    }

    #[test]
    fn rejection_reason_mentions_format() {
        let conn = open_memory_database().unwrap();
        let mut new = submission(b"MZ\x90\x00 executable");
        new.declared_format = "docx".into();
        let decision = evaluate(&conn, &new).unwrap();
        match decision {
            IntakeDecision::Rejected { reason } => {
                assert!(reason.contains("docx"));
                assert!(reason.contains("PDF"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_same_case_detected() {
        let conn = open_memory_database().unwrap();
        let new = submission(PDF);
        let digest = content_digest(PDF);
        let existing = Filing {
            id: Uuid::new_v4(),
            case_number: new.case_number.clone(),
            document_kind: DocumentKind::Plaint,
            filer: new.filer.clone(),
            preferred_language: "hi".into(),
            declared_format: "pdf".into(),
            detected_format: FilingFormat::Pdf,
            content_ref: "blob://x".into(),
            content_sha256: digest,
            state: FilingState::BriefReady,
            submitted_at: Utc::now(),
        };
        repository::insert_filing(&conn, &existing).unwrap();

        let decision = evaluate(&conn, &new).unwrap();
        match decision {
            IntakeDecision::Duplicate { existing: id } => assert_eq!(id, existing.id),
            other => panic!("expected duplicate, got {other:?}"),
        }

        // Same bytes under a different case are a fresh filing.
        let mut other_case = submission(PDF);
        other_case.case_number = "CRL-2026-0099".into();
        assert!(matches!(
            evaluate(&conn, &other_case).unwrap(),
            IntakeDecision::Admit { .. }
        ));
    }
}
