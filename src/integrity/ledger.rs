//! Tamper-evident hash ledger.
//!
//! The trait exposes only append and read operations; there is no way to
//! express an update or delete through it, so mutating a committed entry
//! is a compile-time impossibility rather than a runtime check.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::events::{AlertSeverity, EventKind, EventSink};
use crate::models::{HashRecord, LedgerEntry, TamperFlag};
use crate::resilience::{FailureKind, Retryable};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying storage unavailable; callers retry with backoff.
    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),

    /// The filing has an uncleared tamper flag; unusable for proceedings.
    #[error("filing {0} is blocked pending manual review of a tamper flag")]
    Blocked(Uuid),
}

impl From<DatabaseError> for LedgerError {
    fn from(e: DatabaseError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl Retryable for LedgerError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Unavailable(_) => FailureKind::Transient,
            Self::Blocked(_) => FailureKind::Permanent,
        }
    }

    fn timed_out() -> Self {
        Self::Unavailable("operation timed out".into())
    }
}

/// Result of comparing a recomputed digest against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    Mismatch { expected: String, observed: String },
}

/// Append-only view over the hash ledger.
pub trait HashLedger: Send + Sync {
    /// Commit a hash record, assigning the next global sequence number.
    /// Re-appending for a filing that already has an original returns the
    /// existing entry; a second original can never be created.
    fn append(&self, record: HashRecord) -> Result<LedgerEntry, LedgerError>;

    /// Compare a recomputed digest against the original entry. A mismatch
    /// raises a tamper flag and a critical alert; once flagged, every
    /// subsequent call for that filing fails `Blocked` until the flag is
    /// cleared externally.
    fn verify(
        &self,
        filing_id: Uuid,
        recomputed: &str,
        actor: &str,
    ) -> Result<VerifyOutcome, LedgerError>;

    /// The lowest-sequence entry for the filing.
    fn get_original(&self, filing_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Proceedings-use gate: Err(Blocked) while an uncleared tamper flag
    /// exists.
    fn ensure_usable(&self, filing_id: Uuid) -> Result<(), LedgerError>;
}

/// SQLite-backed ledger over the `ledger_entries` table.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
    sink: Arc<dyn EventSink>,
}

impl SqliteLedger {
    pub fn new(conn: Arc<Mutex<Connection>>, sink: Arc<dyn EventSink>) -> Self {
        Self { conn, sink }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger connection poisoned".into()))
    }
}

impl HashLedger for SqliteLedger {
    fn append(&self, record: HashRecord) -> Result<LedgerEntry, LedgerError> {
        let conn = self.lock()?;
        if let Some(existing) = repository::get_original_entry(&conn, &record.filing_id)? {
            return Ok(existing);
        }

        let txn_id = Uuid::new_v4();
        let sequence = repository::insert_ledger_entry(&conn, &record, txn_id)?;
        drop(conn);

        self.sink.log_event(
            EventKind::LedgerAppend,
            "ledger",
            &format!("filing {} committed at sequence {sequence}", record.filing_id),
        );

        Ok(LedgerEntry {
            sequence,
            txn_id,
            record,
        })
    }

    fn verify(
        &self,
        filing_id: Uuid,
        recomputed: &str,
        actor: &str,
    ) -> Result<VerifyOutcome, LedgerError> {
        self.ensure_usable(filing_id)?;

        let conn = self.lock()?;
        let original = repository::get_original_entry(&conn, &filing_id)?.ok_or_else(|| {
            LedgerError::Unavailable(format!("no ledger entry for filing {filing_id}"))
        })?;

        if original.record.digest == recomputed {
            return Ok(VerifyOutcome::Match);
        }

        let flag = TamperFlag {
            filing_id,
            detected_at: Utc::now(),
            expected_digest: original.record.digest.clone(),
            observed_digest: recomputed.to_string(),
            actor: actor.to_string(),
        };
        repository::insert_tamper_flag(&conn, &flag)?;
        drop(conn);

        self.sink.log_event(
            EventKind::TamperDetected,
            "ledger",
            &format!(
                "filing {filing_id}: digest mismatch (expected {}, observed {recomputed}, actor {actor})",
                original.record.digest
            ),
        );
        self.sink.alert(
            AlertSeverity::Critical,
            &format!("integrity violation on filing {filing_id}: ledger digest mismatch"),
        );

        Ok(VerifyOutcome::Mismatch {
            expected: original.record.digest,
            observed: recomputed.to_string(),
        })
    }

    fn get_original(&self, filing_id: Uuid) -> Result<Option<LedgerEntry>, LedgerError> {
        let conn = self.lock()?;
        Ok(repository::get_original_entry(&conn, &filing_id)?)
    }

    fn ensure_usable(&self, filing_id: Uuid) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        match repository::get_active_tamper_flag(&conn, &filing_id)? {
            Some(_) => Err(LedgerError::Blocked(filing_id)),
            None => Ok(()),
        }
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
