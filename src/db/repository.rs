//! Row mapping for the orchestration store.
//!
//! Insert/select only where the schema is append-only: ledger entries and
//! stage markers never see an UPDATE or DELETE statement; there is no
//! function here that could issue one.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;
use crate::models::*;

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {raw}: {e}")))
}

fn parse_id(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// ═══════════════════════════════════════════
// Filings
// ═══════════════════════════════════════════

pub fn insert_filing(conn: &Connection, filing: &Filing) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO filings (id, case_number, document_kind, filer_id, filer_name, filer_role,
         preferred_language, declared_format, detected_format, content_ref, content_sha256,
         state, submitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            filing.id.to_string(),
            filing.case_number,
            filing.document_kind.as_str(),
            filing.filer.id,
            filing.filer.name,
            filing.filer.role.as_str(),
            filing.preferred_language,
            filing.declared_format,
            filing.detected_format.as_str(),
            filing.content_ref,
            filing.content_sha256,
            filing.state.as_str(),
            filing.submitted_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

const FILING_COLUMNS: &str = "id, case_number, document_kind, filer_id, filer_name, filer_role,
     preferred_language, declared_format, detected_format, content_ref, content_sha256,
     state, submitted_at";

struct FilingRow {
    id: String,
    case_number: String,
    document_kind: String,
    filer_id: String,
    filer_name: String,
    filer_role: String,
    preferred_language: String,
    declared_format: String,
    detected_format: String,
    content_ref: String,
    content_sha256: String,
    state: String,
    submitted_at: String,
}

fn filing_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FilingRow> {
    Ok(FilingRow {
        id: row.get(0)?,
        case_number: row.get(1)?,
        document_kind: row.get(2)?,
        filer_id: row.get(3)?,
        filer_name: row.get(4)?,
        filer_role: row.get(5)?,
        preferred_language: row.get(6)?,
        declared_format: row.get(7)?,
        detected_format: row.get(8)?,
        content_ref: row.get(9)?,
        content_sha256: row.get(10)?,
        state: row.get(11)?,
        submitted_at: row.get(12)?,
    })
}

fn filing_from_row(row: FilingRow) -> Result<Filing, DatabaseError> {
    Ok(Filing {
        id: parse_id(&row.id)?,
        case_number: row.case_number,
        document_kind: DocumentKind::from_str(&row.document_kind)?,
        filer: FilerInfo {
            id: row.filer_id,
            name: row.filer_name,
            role: FilerRole::from_str(&row.filer_role)?,
        },
        preferred_language: row.preferred_language,
        declared_format: row.declared_format,
        detected_format: FilingFormat::from_str(&row.detected_format)?,
        content_ref: row.content_ref,
        content_sha256: row.content_sha256,
        state: FilingState::from_str(&row.state)?,
        submitted_at: parse_ts(&row.submitted_at)?,
    })
}

pub fn get_filing(conn: &Connection, id: &Uuid) -> Result<Option<Filing>, DatabaseError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {FILING_COLUMNS} FROM filings WHERE id = ?1"))?;
    let row = stmt
        .query_row(params![id.to_string()], filing_row)
        .optional()?;
    row.map(filing_from_row).transpose()
}

pub fn update_filing_state(
    conn: &Connection,
    id: &Uuid,
    state: FilingState,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE filings SET state = ?2 WHERE id = ?1",
        params![id.to_string(), state.as_str()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "filing".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Duplicate detection: a byte-identical document already filed for the
/// same case.
pub fn find_duplicate(
    conn: &Connection,
    case_number: &str,
    content_sha256: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT id FROM filings WHERE case_number = ?1 AND content_sha256 = ?2
             ORDER BY submitted_at ASC LIMIT 1",
            params![case_number, content_sha256],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|id| parse_id(&id)).transpose()
}

pub fn list_filings(
    conn: &Connection,
    case_number: Option<&str>,
) -> Result<Vec<Filing>, DatabaseError> {
    let mut out = Vec::new();
    match case_number {
        Some(case) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILING_COLUMNS} FROM filings WHERE case_number = ?1 ORDER BY submitted_at"
            ))?;
            let rows = stmt.query_map(params![case], filing_row)?;
            for row in rows {
                out.push(filing_from_row(row?)?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILING_COLUMNS} FROM filings ORDER BY submitted_at"
            ))?;
            let rows = stmt.query_map([], filing_row)?;
            for row in rows {
                out.push(filing_from_row(row?)?);
            }
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Stage completion markers
// ═══════════════════════════════════════════

/// Record stage completion. First write wins: re-entry after a crash must
/// observe the original result, not overwrite it.
pub fn insert_stage_marker<T: Serialize>(
    conn: &Connection,
    filing_id: &Uuid,
    stage: &str,
    payload: &T,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO stage_markers (filing_id, stage, payload, completed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            filing_id.to_string(),
            stage,
            serde_json::to_string(payload)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_stage_marker<T: DeserializeOwned>(
    conn: &Connection,
    filing_id: &Uuid,
    stage: &str,
) -> Result<Option<T>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT payload FROM stage_markers WHERE filing_id = ?1 AND stage = ?2",
            params![filing_id.to_string(), stage],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|payload| serde_json::from_str(&payload).map_err(DatabaseError::from))
        .transpose()
}

// ═══════════════════════════════════════════
// Integrity ledger
// ═══════════════════════════════════════════

/// Append one ledger row; the sequence number is assigned by the store.
pub fn insert_ledger_entry(
    conn: &Connection,
    record: &HashRecord,
    txn_id: Uuid,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO ledger_entries (txn_id, filing_id, digest, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            txn_id.to_string(),
            record.filing_id.to_string(),
            record.digest,
            serde_json::to_string(&record.metadata)?,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

struct LedgerRow {
    sequence: i64,
    txn_id: String,
    filing_id: String,
    digest: String,
    metadata: String,
    created_at: String,
}

pub fn get_original_entry(
    conn: &Connection,
    filing_id: &Uuid,
) -> Result<Option<LedgerEntry>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT sequence, txn_id, filing_id, digest, metadata, created_at
             FROM ledger_entries WHERE filing_id = ?1 ORDER BY sequence ASC LIMIT 1",
            params![filing_id.to_string()],
            |row| {
                Ok(LedgerRow {
                    sequence: row.get(0)?,
                    txn_id: row.get(1)?,
                    filing_id: row.get(2)?,
                    digest: row.get(3)?,
                    metadata: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.map(|row| {
        Ok(LedgerEntry {
            sequence: row.sequence,
            txn_id: parse_id(&row.txn_id)?,
            record: HashRecord {
                filing_id: parse_id(&row.filing_id)?,
                digest: row.digest,
                metadata: serde_json::from_str(&row.metadata)?,
                created_at: parse_ts(&row.created_at)?,
            },
        })
    })
    .transpose()
}

// ═══════════════════════════════════════════
// Tamper flags
// ═══════════════════════════════════════════

pub fn insert_tamper_flag(conn: &Connection, flag: &TamperFlag) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO tamper_flags
         (filing_id, detected_at, expected_digest, observed_digest, actor)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            flag.filing_id.to_string(),
            flag.detected_at.to_rfc3339(),
            flag.expected_digest,
            flag.observed_digest,
            flag.actor,
        ],
    )?;
    Ok(())
}

pub fn get_active_tamper_flag(
    conn: &Connection,
    filing_id: &Uuid,
) -> Result<Option<TamperFlag>, DatabaseError> {
    struct FlagRow {
        filing_id: String,
        detected_at: String,
        expected_digest: String,
        observed_digest: String,
        actor: String,
    }

    let row = conn
        .query_row(
            "SELECT filing_id, detected_at, expected_digest, observed_digest, actor
             FROM tamper_flags WHERE filing_id = ?1 AND cleared = 0",
            params![filing_id.to_string()],
            |row| {
                Ok(FlagRow {
                    filing_id: row.get(0)?,
                    detected_at: row.get(1)?,
                    expected_digest: row.get(2)?,
                    observed_digest: row.get(3)?,
                    actor: row.get(4)?,
                })
            },
        )
        .optional()?;

    row.map(|row| {
        Ok(TamperFlag {
            filing_id: parse_id(&row.filing_id)?,
            detected_at: parse_ts(&row.detected_at)?,
            expected_digest: row.expected_digest,
            observed_digest: row.observed_digest,
            actor: row.actor,
        })
    })
    .transpose()
}

/// Record an external manual clearance. Returns false when no active flag
/// existed.
pub fn clear_tamper_flag(conn: &Connection, filing_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE tamper_flags SET cleared = 1, cleared_at = ?2 WHERE filing_id = ?1 AND cleared = 0",
        params![filing_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(changed > 0)
}

// ═══════════════════════════════════════════
// Hearing briefs
// ═══════════════════════════════════════════

pub fn insert_brief(conn: &Connection, brief: &HearingBrief) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO briefs
         (filing_id, case_number, compliant, degraded, score, contradictions, citations,
          filed_at, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            brief.filing_id.to_string(),
            brief.case_number,
            brief.procedurally_compliant as i32,
            brief.degraded as i32,
            brief.trial_readiness,
            serde_json::to_string(&brief.contradictions)?,
            serde_json::to_string(&brief.citations)?,
            brief.filed_at.to_rfc3339(),
            brief.generated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

struct BriefRow {
    filing_id: String,
    case_number: String,
    compliant: i32,
    degraded: i32,
    score: f64,
    contradictions: String,
    citations: String,
    filed_at: String,
    generated_at: String,
}

fn brief_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BriefRow> {
    Ok(BriefRow {
        filing_id: row.get(0)?,
        case_number: row.get(1)?,
        compliant: row.get(2)?,
        degraded: row.get(3)?,
        score: row.get(4)?,
        contradictions: row.get(5)?,
        citations: row.get(6)?,
        filed_at: row.get(7)?,
        generated_at: row.get(8)?,
    })
}

fn brief_from_row(row: BriefRow) -> Result<HearingBrief, DatabaseError> {
    Ok(HearingBrief {
        filing_id: parse_id(&row.filing_id)?,
        case_number: row.case_number,
        procedurally_compliant: row.compliant != 0,
        contradictions: serde_json::from_str(&row.contradictions)?,
        citations: serde_json::from_str(&row.citations)?,
        degraded: row.degraded != 0,
        trial_readiness: row.score,
        priority_rank: None,
        filed_at: parse_ts(&row.filed_at)?,
        generated_at: parse_ts(&row.generated_at)?,
    })
}

const BRIEF_COLUMNS: &str = "filing_id, case_number, compliant, degraded, score, contradictions,
     citations, filed_at, generated_at";

pub fn get_brief(conn: &Connection, filing_id: &Uuid) -> Result<Option<HearingBrief>, DatabaseError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {BRIEF_COLUMNS} FROM briefs WHERE filing_id = ?1"))?;
    let row = stmt
        .query_row(params![filing_id.to_string()], brief_row)
        .optional()?;
    row.map(brief_from_row).transpose()
}

pub fn list_briefs(
    conn: &Connection,
    case_number: Option<&str>,
) -> Result<Vec<HearingBrief>, DatabaseError> {
    let mut out = Vec::new();
    match case_number {
        Some(case) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRIEF_COLUMNS} FROM briefs WHERE case_number = ?1"
            ))?;
            let rows = stmt.query_map(params![case], brief_row)?;
            for row in rows {
                out.push(brief_from_row(row?)?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!("SELECT {BRIEF_COLUMNS} FROM briefs"))?;
            let rows = stmt.query_map([], brief_row)?;
            for row in rows {
                out.push(brief_from_row(row?)?);
            }
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
