//! Structured event emission consumed by downstream alerting.
//!
//! The pipeline never writes to its alerting transport directly; it emits
//! through an `EventSink`. Sinks are fire-and-forget: they must never
//! block pipeline progress and never surface their own failures to the
//! caller.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// What happened. Rendered as a stable string for persistence and for
/// downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateTransition,
    BreakerTransition,
    ShortCircuit,
    RetryExhausted,
    LedgerAppend,
    TamperDetected,
    TranslationFallback,
    AuditDegraded,
    ManualReview,
    Cancellation,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateTransition => "state_transition",
            Self::BreakerTransition => "breaker_transition",
            Self::ShortCircuit => "short_circuit",
            Self::RetryExhausted => "retry_exhausted",
            Self::LedgerAppend => "ledger_append",
            Self::TamperDetected => "tamper_detected",
            Self::TranslationFallback => "translation_fallback",
            Self::AuditDegraded => "audit_degraded",
            Self::ManualReview => "manual_review",
            Self::Cancellation => "cancellation",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

/// One structured log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub kind: EventKind,
    pub component: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// One alert record.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// One-way sink for pipeline events.
pub trait EventSink: Send + Sync {
    fn log_event(&self, kind: EventKind, component: &str, detail: &str);
    fn alert(&self, severity: AlertSeverity, detail: &str);
}

// ═══════════════════════════════════════════════════════════
// Tracing sink (default)
// ═══════════════════════════════════════════════════════════

/// Forwards events to `tracing`. The default sink in production.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn log_event(&self, kind: EventKind, component: &str, detail: &str) {
        tracing::info!(kind = kind.as_str(), component, detail, "pipeline event");
    }

    fn alert(&self, severity: AlertSeverity, detail: &str) {
        match severity {
            AlertSeverity::Critical => {
                tracing::error!(severity = severity.as_str(), detail, "pipeline alert")
            }
            AlertSeverity::Warning => {
                tracing::warn!(severity = severity.as_str(), detail, "pipeline alert")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// SQLite sink
// ═══════════════════════════════════════════════════════════

/// Appends events to the `audit_log` / `alerts` tables. Write failures are
/// logged and swallowed; the sink must not stall the pipeline.
pub struct SqliteEventSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventSink {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl EventSink for SqliteEventSink {
    fn log_event(&self, kind: EventKind, component: &str, detail: &str) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let result = conn.execute(
            "INSERT INTO audit_log (at, kind, component, detail) VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), kind.as_str(), component, detail],
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, "audit_log append failed");
        }
    }

    fn alert(&self, severity: AlertSeverity, detail: &str) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let result = conn.execute(
            "INSERT INTO alerts (at, severity, detail) VALUES (?1, ?2, ?3)",
            params![Utc::now().to_rfc3339(), severity.as_str(), detail],
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, "alert append failed");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// In-memory sink
// ═══════════════════════════════════════════════════════════

/// Captures events in memory. Used by tests and by embedders that ship
/// events over their own transport.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LogEvent>>,
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn events_of_kind(&self, kind: EventKind) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn log_event(&self, kind: EventKind, component: &str, detail: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(LogEvent {
                kind,
                component: component.to_string(),
                detail: detail.to_string(),
                at: Utc::now(),
            });
        }
    }

    fn alert(&self, severity: AlertSeverity, detail: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(Alert {
                severity,
                detail: detail.to_string(),
                at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_captures_events_and_alerts() {
        let sink = MemoryEventSink::new();
        sink.log_event(EventKind::StateTransition, "coordinator", "ingested -> scrutinizing");
        sink.alert(AlertSeverity::Critical, "hash mismatch");

        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].kind, EventKind::StateTransition);
        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(sink.alerts()[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn sqlite_sink_appends_rows() {
        let conn = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let sink = SqliteEventSink::new(conn.clone());
        sink.log_event(EventKind::LedgerAppend, "ledger", "seq=1");
        sink.alert(AlertSeverity::Warning, "translation fallback");

        let guard = conn.lock().unwrap();
        let events: i64 = guard
            .query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get(0))
            .unwrap();
        let alerts: i64 = guard
            .query_row("SELECT COUNT(*) FROM alerts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(events, 1);
        assert_eq!(alerts, 1);
    }
}
