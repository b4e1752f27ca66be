//! Entry points: submission, brief retrieval, ranking, cancellation.
//!
//! Owns the shared orchestration state (store connection, breaker
//! registry, ledger, admission queue) and hands each admitted filing to
//! the coordinator. Admission is a fair semaphore: under sustained load,
//! longer-waiting filings enter their first stage before newer arrivals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{PipelinePolicies, MAX_CONCURRENT_FILINGS};
use crate::db::repository;
use crate::events::{EventKind, EventSink};
use crate::integrity::{compute_filing_hash, HashLedger, SqliteLedger, VerifyOutcome};
use crate::models::*;
use crate::pipeline::analyzers::Analyzers;
use crate::pipeline::coordinator::{CancelFlag, Coordinator, REMEDIATION_MARKER};
use crate::pipeline::{intake, scoring, PipelineError};
use crate::resilience::{with_retry, BreakerRegistry, RetryError};

/// Result of a submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted { filing_id: Uuid },
    /// Byte-identical document already filed for this case.
    Duplicate { existing: Uuid },
    Rejected { reason: String },
}

/// Brief retrieval status.
#[derive(Debug, Clone)]
pub enum BriefStatus {
    Ready(HearingBrief),
    Pending,
    NotFound,
}

struct RunHandle {
    cancel: CancelFlag,
    task: Option<JoinHandle<()>>,
}

pub struct FilingService {
    conn: Arc<Mutex<Connection>>,
    coordinator: Arc<Coordinator>,
    ledger: Arc<dyn HashLedger>,
    analyzers: Analyzers,
    policies: PipelinePolicies,
    admission: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
    runs: Mutex<HashMap<Uuid, RunHandle>>,
}

impl FilingService {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        analyzers: Analyzers,
        policies: PipelinePolicies,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let ledger: Arc<dyn HashLedger> =
            Arc::new(SqliteLedger::new(conn.clone(), sink.clone()));
        let breakers = Arc::new(BreakerRegistry::new(policies.breaker.clone(), sink.clone()));
        let coordinator = Arc::new(Coordinator::new(
            conn.clone(),
            ledger.clone(),
            analyzers.clone(),
            breakers,
            policies.clone(),
            sink.clone(),
        ));
        Arc::new(Self {
            conn,
            coordinator,
            ledger,
            analyzers,
            policies,
            admission: Arc::new(Semaphore::new(MAX_CONCURRENT_FILINGS)),
            sink,
            runs: Mutex::new(HashMap::new()),
        })
    }

    /// Validate, ingest, and enqueue a filing. Rejection happens only for
    /// unsupported formats and oversized documents; storage trouble is an
    /// error, not a rejection.
    pub async fn submit(&self, new: NewFiling) -> Result<SubmitOutcome, PipelineError> {
        let decision = {
            let conn = self.db();
            intake::evaluate(&conn, &new)?
        };
        let (detected_format, content_sha256) = match decision {
            intake::IntakeDecision::Rejected { reason } => {
                self.sink.log_event(
                    EventKind::Error,
                    "intake",
                    &format!("submission rejected: {reason}"),
                );
                return Ok(SubmitOutcome::Rejected { reason });
            }
            intake::IntakeDecision::Duplicate { existing } => {
                tracing::info!(existing = %existing, "duplicate submission");
                return Ok(SubmitOutcome::Duplicate { existing });
            }
            intake::IntakeDecision::Admit {
                detected_format,
                content_sha256,
            } => (detected_format, content_sha256),
        };

        let filing_id = Uuid::new_v4();
        let content_ref = with_retry(&self.policies.retry, || {
            self.analyzers.blobs.persist(filing_id, &new.content)
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { source } | RetryError::Permanent { source } => {
                PipelineError::Storage(source.to_string())
            }
        })?;

        let filing = Filing {
            id: filing_id,
            case_number: new.case_number,
            document_kind: new.document_kind,
            filer: new.filer,
            preferred_language: new.preferred_language,
            declared_format: new.declared_format,
            detected_format,
            content_ref,
            content_sha256,
            state: FilingState::Ingested,
            submitted_at: Utc::now(),
        };

        // The metadata index is external and advisory; its failure is
        // logged, never fatal to intake.
        if let Err(e) = with_retry(&self.policies.retry, || {
            self.analyzers.metadata.persist(&filing)
        })
        .await
        {
            self.sink.log_event(
                EventKind::Error,
                "intake",
                &format!("metadata index write failed for filing {filing_id}: {e}"),
            );
        }

        {
            let conn = self.db();
            repository::insert_filing(&conn, &filing)?;
        }
        self.sink.log_event(
            EventKind::StateTransition,
            "intake",
            &format!("filing {filing_id}: ingested for case {}", filing.case_number),
        );

        self.enqueue(filing_id);
        Ok(SubmitOutcome::Accepted { filing_id })
    }

    /// Spawn the pipeline run behind the fair admission semaphore.
    fn enqueue(&self, filing_id: Uuid) {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let coordinator = self.coordinator.clone();
        let admission = self.admission.clone();
        let sink = self.sink.clone();

        let task = tokio::spawn(async move {
            let Ok(_permit) = admission.acquire_owned().await else {
                return;
            };
            if let Err(e) = coordinator.run(filing_id, &flag).await {
                sink.log_event(
                    EventKind::Error,
                    "service",
                    &format!("filing {filing_id}: pipeline error: {e}"),
                );
            }
        });

        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(
                filing_id,
                RunHandle {
                    cancel,
                    task: Some(task),
                },
            );
        }
    }

    /// Drive a filing synchronously (embedders that manage their own
    /// scheduling). Honors the same admission semaphore.
    pub async fn process(&self, filing_id: Uuid) -> Result<FilingState, PipelineError> {
        let cancel = self.cancel_flag(filing_id);
        let Ok(_permit) = self.admission.clone().acquire_owned().await else {
            return Err(PipelineError::Storage("admission queue closed".into()));
        };
        self.coordinator.run(filing_id, &cancel).await
    }

    /// Request cancellation; honored between stages. Past the ledger
    /// commit the run converts to manual review instead of aborting.
    pub fn cancel(&self, filing_id: Uuid) {
        let flag = self.cancel_flag(filing_id);
        flag.cancel();
        self.sink.log_event(
            EventKind::Cancellation,
            "service",
            &format!("cancellation requested for filing {filing_id}"),
        );
    }

    /// Await the background run spawned by `submit`, if any.
    pub async fn join(&self, filing_id: Uuid) {
        let task = self
            .runs
            .lock()
            .ok()
            .and_then(|mut runs| runs.get_mut(&filing_id).and_then(|h| h.task.take()));
        if let Some(task) = task {
            if let Err(e) = task.await {
                self.sink.log_event(
                    EventKind::Error,
                    "service",
                    &format!("filing {filing_id}: run task failed: {e}"),
                );
            }
        }
    }

    pub fn get_brief(&self, filing_id: Uuid) -> Result<BriefStatus, PipelineError> {
        // Tamper-flagged filings are unusable until cleared.
        self.ledger.ensure_usable(filing_id)?;

        let conn = self.db();
        if let Some(brief) = repository::get_brief(&conn, &filing_id)? {
            return Ok(BriefStatus::Ready(brief));
        }
        match repository::get_filing(&conn, &filing_id)? {
            None => Ok(BriefStatus::NotFound),
            // Terminal without a brief (remediated, failed, cancelled,
            // manual review): no brief will ever exist.
            Some(filing) if filing.state.is_terminal() => Ok(BriefStatus::NotFound),
            Some(_) => Ok(BriefStatus::Pending),
        }
    }

    /// Ranked briefs, optionally restricted to one case. Tamper-blocked
    /// filings are excluded from scheduling.
    pub fn get_ranked_cases(
        &self,
        case_number: Option<&str>,
    ) -> Result<Vec<HearingBrief>, PipelineError> {
        let briefs = {
            let conn = self.db();
            let all = repository::list_briefs(&conn, case_number)?;
            let mut usable = Vec::with_capacity(all.len());
            for brief in all {
                if repository::get_active_tamper_flag(&conn, &brief.filing_id)?.is_none() {
                    usable.push(brief);
                }
            }
            usable
        };
        Ok(scoring::rank(briefs))
    }

    /// The remediation guide for a defective filing, once generated.
    pub fn get_remediation(
        &self,
        filing_id: Uuid,
    ) -> Result<Option<RemediationGuide>, PipelineError> {
        let conn = self.db();
        Ok(repository::get_stage_marker(
            &conn,
            &filing_id,
            REMEDIATION_MARKER,
        )?)
    }

    /// Recompute the filing's digest and compare against the ledger; the
    /// proceedings-use integrity check.
    pub async fn verify_integrity(
        &self,
        filing_id: Uuid,
        actor: &str,
    ) -> Result<VerifyOutcome, PipelineError> {
        let filing = {
            let conn = self.db();
            repository::get_filing(&conn, &filing_id)?
        }
        .ok_or(PipelineError::FilingNotFound(filing_id))?;

        let content = with_retry(&self.policies.retry, || {
            self.analyzers.blobs.fetch(&filing.content_ref)
        })
        .await
        .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let metadata = HashMetadata {
            case_number: filing.case_number.clone(),
            document_kind: filing.document_kind,
            filed_at: filing.submitted_at,
            filer_id: filing.filer.id.clone(),
        };
        let recomputed = compute_filing_hash(&content, &metadata);
        let outcome = self.ledger.verify(filing_id, &recomputed, actor)?;

        if matches!(outcome, VerifyOutcome::Mismatch { .. }) {
            let conn = self.db();
            repository::update_filing_state(&conn, &filing_id, FilingState::ManualReview)?;
        }
        Ok(outcome)
    }

    /// Record an external manual clearance of a tamper flag.
    pub fn record_manual_clearance(&self, filing_id: Uuid) -> Result<bool, PipelineError> {
        let cleared = {
            let conn = self.db();
            repository::clear_tamper_flag(&conn, &filing_id)?
        };
        if cleared {
            self.sink.log_event(
                EventKind::ManualReview,
                "service",
                &format!("tamper flag cleared for filing {filing_id}"),
            );
        }
        Ok(cleared)
    }

    /// Operational listing of filings, optionally by case.
    pub fn list_filings(&self, case_number: Option<&str>) -> Result<Vec<Filing>, PipelineError> {
        let conn = self.db();
        Ok(repository::list_filings(&conn, case_number)?)
    }

    /// The completed stage results for a filing, in stage order.
    pub fn get_stage_results(&self, filing_id: Uuid) -> Result<Vec<StageResult>, PipelineError> {
        self.coordinator.stage_results(&filing_id)
    }

    fn cancel_flag(&self, filing_id: Uuid) -> CancelFlag {
        self.runs
            .lock()
            .ok()
            .and_then(|runs| runs.get(&filing_id).map(|h| h.cancel.clone()))
            .unwrap_or_default()
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
