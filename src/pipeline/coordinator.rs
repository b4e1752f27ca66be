//! Stage coordinator: drives a filing through Scrutiny → Integrity →
//! Audit.
//!
//! Re-entry is safe at any point: every stage checks its durable
//! completion marker before making a side-effecting call, so re-driving a
//! filing after a crash never duplicates a ledger entry or re-runs a
//! completed analysis, and converges to the same terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::analyzers::{Analyzers, ExtractedStructure};
use super::{audit, remediation, scoring, scrutiny, PipelineError, StageFailure};
use crate::config::PipelinePolicies;
use crate::db::repository;
use crate::events::{AlertSeverity, EventKind, EventSink};
use crate::integrity::{compute_filing_hash, HashLedger, VerifyOutcome};
use crate::models::*;
use crate::resilience::{with_retry, BreakerRegistry, RetryError};

const STAGE_EXTRACTION: &str = "extraction";
const STAGE_SCRUTINY: &str = "scrutiny";
const STAGE_REMEDIATION: &str = "remediation";
const STAGE_INTEGRITY: &str = "integrity";
const STAGE_AUDIT: &str = "audit";

/// Cooperative cancellation, honored between stages only.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Coordinator {
    conn: Arc<Mutex<Connection>>,
    ledger: Arc<dyn HashLedger>,
    analyzers: Analyzers,
    breakers: Arc<BreakerRegistry>,
    policies: PipelinePolicies,
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        ledger: Arc<dyn HashLedger>,
        analyzers: Analyzers,
        breakers: Arc<BreakerRegistry>,
        policies: PipelinePolicies,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            conn,
            ledger,
            analyzers,
            breakers,
            policies,
            sink,
        }
    }

    /// Drive the filing to a terminal state. Idempotent: a filing already
    /// terminal returns immediately.
    pub async fn run(
        &self,
        filing_id: Uuid,
        cancel: &CancelFlag,
    ) -> Result<FilingState, PipelineError> {
        let filing = {
            let conn = self.db();
            repository::get_filing(&conn, &filing_id)?
        }
        .ok_or(PipelineError::FilingNotFound(filing_id))?;

        if filing.state.is_terminal() {
            return Ok(filing.state);
        }

        // A tamper-flagged filing is unusable for proceedings.
        if self.ledger.ensure_usable(filing_id).is_err() {
            return self.manual_review(&filing, filing.state, "tamper flag active", false);
        }

        let mut state = self.transition(&filing, filing.state, FilingState::Scrutinizing)?;

        // Content backs extraction, the digest, and tamper verification.
        let content = match with_retry(&self.policies.retry, || {
            self.analyzers.blobs.fetch(&filing.content_ref)
        })
        .await
        {
            Ok(content) => content,
            Err(RetryError::Exhausted { source } | RetryError::Permanent { source }) => {
                self.sink.log_event(
                    EventKind::RetryExhausted,
                    "coordinator",
                    &format!("filing {filing_id}: content fetch failed: {source}"),
                );
                return self.manual_review(
                    &filing,
                    state,
                    &format!("content unavailable: {source}"),
                    true,
                );
            }
        };

        // ── Scrutiny ─────────────────────────────────────
        let structure = match self.marker::<ExtractedStructure>(&filing_id, STAGE_EXTRACTION)? {
            Some(cached) => cached,
            None => {
                match scrutiny::run_extraction(
                    &self.analyzers,
                    &self.breakers,
                    &self.policies,
                    &content,
                )
                .await
                {
                    Ok(structure) => {
                        self.store_marker(&filing_id, STAGE_EXTRACTION, &structure)?;
                        structure
                    }
                    Err(failure) => return self.stage_failed(&filing, state, failure),
                }
            }
        };

        let scrutiny_result = match self.marker::<ScrutinyResult>(&filing_id, STAGE_SCRUTINY)? {
            Some(cached) => cached,
            None => {
                match scrutiny::run_validation(
                    &self.analyzers,
                    &self.breakers,
                    &self.policies,
                    &structure,
                )
                .await
                {
                    Ok(result) => {
                        self.store_marker(&filing_id, STAGE_SCRUTINY, &result)?;
                        result
                    }
                    Err(failure) => return self.stage_failed(&filing, state, failure),
                }
            }
        };

        // ── Defective branch ─────────────────────────────
        if !scrutiny_result.compliant() {
            state = self.transition(&filing, state, FilingState::Defective)?;
            if self
                .marker::<RemediationGuide>(&filing_id, STAGE_REMEDIATION)?
                .is_none()
            {
                let guide = remediation::build_guide(
                    &self.analyzers,
                    &self.breakers,
                    &self.policies,
                    self.sink.as_ref(),
                    &scrutiny_result.defects(),
                    &filing.preferred_language,
                )
                .await;
                self.store_marker(&filing_id, STAGE_REMEDIATION, &guide)?;
            }
            return self.transition(&filing, state, FilingState::Remediated);
        }

        state = self.transition(&filing, state, FilingState::IntegrityPending)?;

        // ── Integrity ────────────────────────────────────
        let integrity_cached = self.marker::<IntegrityResult>(&filing_id, STAGE_INTEGRITY)?;
        if cancel.is_cancelled() {
            return self.cancelled(&filing, state, integrity_cached.is_some());
        }

        if integrity_cached.is_none() {
            state = self.transition(&filing, state, FilingState::IntegrityRecording)?;
            // Hash first, then append; the digest is an input to the
            // ledger record, so the two never run concurrently.
            let metadata = hash_metadata(&filing);
            let record = HashRecord {
                filing_id,
                digest: compute_filing_hash(&content, &metadata),
                metadata,
                created_at: Utc::now(),
            };
            let entry = match with_retry(&self.policies.retry, || {
                let record = record.clone();
                let ledger = self.ledger.clone();
                async move { ledger.append(record) }
            })
            .await
            {
                Ok(entry) => entry,
                Err(RetryError::Exhausted { source }) => {
                    self.sink.log_event(
                        EventKind::RetryExhausted,
                        "coordinator",
                        &format!("filing {filing_id}: ledger append failed: {source}"),
                    );
                    return self.manual_review(
                        &filing,
                        state,
                        &format!("ledger append failed: {source}"),
                        true,
                    );
                }
                Err(RetryError::Permanent { source }) => {
                    return self.manual_review(&filing, state, &source.to_string(), false);
                }
            };
            let result = IntegrityResult {
                sequence: entry.sequence,
                txn_id: entry.txn_id,
                digest: entry.record.digest.clone(),
                recorded_at: entry.record.created_at,
            };
            self.store_marker(&filing_id, STAGE_INTEGRITY, &result)?;
        }

        // The append has committed; cancellation can no longer un-record.
        if cancel.is_cancelled() {
            return self.cancelled(&filing, state, true);
        }

        state = self.transition(&filing, state, FilingState::AuditPending)?;

        // Tamper verification before any substantive use.
        let recomputed = compute_filing_hash(&content, &hash_metadata(&filing));
        let verdict = with_retry(&self.policies.retry, || {
            let ledger = self.ledger.clone();
            let recomputed = recomputed.clone();
            async move { ledger.verify(filing_id, &recomputed, "coordinator") }
        })
        .await;
        match verdict {
            Ok(VerifyOutcome::Match) => {}
            Ok(VerifyOutcome::Mismatch { .. }) => {
                // The ledger raised the tamper flag and the critical alert.
                return self.manual_review(&filing, state, "ledger digest mismatch", false);
            }
            Err(RetryError::Permanent { source }) => {
                return self.manual_review(&filing, state, &source.to_string(), false);
            }
            Err(RetryError::Exhausted { source }) => {
                self.sink.log_event(
                    EventKind::RetryExhausted,
                    "coordinator",
                    &format!("filing {filing_id}: ledger verify failed: {source}"),
                );
                return self.manual_review(
                    &filing,
                    state,
                    &format!("ledger verify failed: {source}"),
                    true,
                );
            }
        }

        state = self.transition(&filing, state, FilingState::Auditing)?;

        // ── Audit ────────────────────────────────────────
        let audit_result = match self.marker::<AuditResult>(&filing_id, STAGE_AUDIT)? {
            Some(cached) => cached,
            None => {
                match audit::run_audit(
                    &self.analyzers,
                    &self.breakers,
                    &self.policies,
                    self.sink.as_ref(),
                    &filing.case_number,
                    &structure.text,
                )
                .await
                {
                    Ok(result) => {
                        self.store_marker(&filing_id, STAGE_AUDIT, &result)?;
                        result
                    }
                    Err(failure) => return self.stage_failed(&filing, state, failure),
                }
            }
        };

        // Brief assembly is pure; re-entry after a crash between marker
        // and brief rebuilds it from the marker without external calls.
        let brief = scoring::assemble_brief(
            &filing,
            &scrutiny_result,
            audit_result,
            &self.policies.scoring,
        );
        {
            let conn = self.db();
            repository::insert_brief(&conn, &brief)?;
        }

        self.transition(&filing, state, FilingState::BriefReady)
    }

    /// The filing's append-only stage result sequence, rebuilt from the
    /// durable markers.
    pub fn stage_results(&self, filing_id: &Uuid) -> Result<Vec<StageResult>, PipelineError> {
        let mut results = Vec::new();
        if let Some(scrutiny) = self.marker::<ScrutinyResult>(filing_id, STAGE_SCRUTINY)? {
            results.push(StageResult::Scrutiny(scrutiny));
        }
        if let Some(integrity) = self.marker::<IntegrityResult>(filing_id, STAGE_INTEGRITY)? {
            results.push(StageResult::Integrity(integrity));
        }
        if let Some(audit) = self.marker::<AuditResult>(filing_id, STAGE_AUDIT)? {
            results.push(StageResult::Audit(audit));
        }
        Ok(results)
    }

    // ───────────────────────────────────────────────────
    // Transition helpers
    // ───────────────────────────────────────────────────

    fn transition(
        &self,
        filing: &Filing,
        from: FilingState,
        to: FilingState,
    ) -> Result<FilingState, PipelineError> {
        if from == to {
            return Ok(to);
        }
        {
            let conn = self.db();
            repository::update_filing_state(&conn, &filing.id, to)?;
        }
        self.sink.log_event(
            EventKind::StateTransition,
            "coordinator",
            &format!("filing {}: {} -> {}", filing.id, from.as_str(), to.as_str()),
        );
        Ok(to)
    }

    fn manual_review(
        &self,
        filing: &Filing,
        from: FilingState,
        detail: &str,
        alert: bool,
    ) -> Result<FilingState, PipelineError> {
        self.sink.log_event(
            EventKind::ManualReview,
            "coordinator",
            &format!("filing {}: {detail}", filing.id),
        );
        if alert {
            self.sink.alert(
                AlertSeverity::Critical,
                &format!("filing {} requires manual review: {detail}", filing.id),
            );
        }
        self.transition(filing, from, FilingState::ManualReview)
    }

    fn cancelled(
        &self,
        filing: &Filing,
        from: FilingState,
        integrity_committed: bool,
    ) -> Result<FilingState, PipelineError> {
        if integrity_committed {
            self.sink.log_event(
                EventKind::Cancellation,
                "coordinator",
                &format!(
                    "filing {}: cancelled after integrity commit; converting to manual review",
                    filing.id
                ),
            );
            self.manual_review(
                filing,
                from,
                "cancelled after integrity commit; ledger entry retained",
                false,
            )
        } else {
            self.sink.log_event(
                EventKind::Cancellation,
                "coordinator",
                &format!("filing {}: cancelled before integrity commit", filing.id),
            );
            self.transition(filing, from, FilingState::Cancelled)
        }
    }

    fn stage_failed(
        &self,
        filing: &Filing,
        from: FilingState,
        failure: StageFailure,
    ) -> Result<FilingState, PipelineError> {
        match &failure {
            StageFailure::Permanent { .. } => {
                self.sink.log_event(
                    EventKind::Error,
                    "coordinator",
                    &format!("filing {}: {failure}", filing.id),
                );
                self.transition(filing, from, FilingState::Failed)
            }
            StageFailure::Exhausted { .. } => {
                self.sink.log_event(
                    EventKind::RetryExhausted,
                    "coordinator",
                    &format!("filing {}: {failure}", filing.id),
                );
                self.manual_review(filing, from, &failure.to_string(), true)
            }
            StageFailure::ShortCircuited { .. } => {
                self.sink.log_event(
                    EventKind::ShortCircuit,
                    "coordinator",
                    &format!("filing {}: {failure}", filing.id),
                );
                self.manual_review(filing, from, &failure.to_string(), true)
            }
        }
    }

    // ───────────────────────────────────────────────────
    // Store helpers
    // ───────────────────────────────────────────────────

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn marker<T: DeserializeOwned>(
        &self,
        filing_id: &Uuid,
        stage: &str,
    ) -> Result<Option<T>, PipelineError> {
        let conn = self.db();
        Ok(repository::get_stage_marker(&conn, filing_id, stage)?)
    }

    fn store_marker<T: Serialize>(
        &self,
        filing_id: &Uuid,
        stage: &str,
        payload: &T,
    ) -> Result<(), PipelineError> {
        let conn = self.db();
        Ok(repository::insert_stage_marker(&conn, filing_id, stage, payload)?)
    }
}

fn hash_metadata(filing: &Filing) -> HashMetadata {
    HashMetadata {
        case_number: filing.case_number.clone(),
        document_kind: filing.document_kind,
        filed_at: filing.submitted_at,
        filer_id: filing.filer.id.clone(),
    }
}

/// Marker key for the remediation guide, shared with the service layer.
pub(crate) const REMEDIATION_MARKER: &str = STAGE_REMEDIATION;

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
