//! Application constants and pipeline policy knobs.
//!
//! Every constant the pipeline treats as policy (retry schedule, breaker
//! thresholds, per-dependency timeouts, scoring weights) lives here as a
//! plain struct with documented defaults, so deployments and tests can
//! construct variants instead of patching call sites.

use std::time::Duration;

use serde::Serialize;

use crate::models::enums::Severity;
use crate::resilience::Dependency;

/// Application-level constants
pub const APP_NAME: &str = "Dwarpal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "dwarpal=info"
}

/// Hard cap on submitted document size.
pub const MAX_SUBMISSION_BYTES: u64 = 100 * 1024 * 1024; // 100MB

/// Capacity floor: concurrent filings admitted into the pipeline.
pub const MAX_CONCURRENT_FILINGS: usize = 100;

// ═══════════════════════════════════════════════════════════
// Retry
// ═══════════════════════════════════════════════════════════

/// Bounded exponential backoff applied to transient failures only.
///
/// Defaults: 3 attempts at 2s / 4s / 8s.
#[derive(Debug, Clone, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (attempt is 1-based; the first retry
    /// follows attempt 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        self.base_delay.mul_f64(self.factor.powi(exp as i32))
    }
}

// ═══════════════════════════════════════════════════════════
// Circuit breaker
// ═══════════════════════════════════════════════════════════

/// Per-dependency failure gating.
///
/// Closed→Open when the failure rate over `window` exceeds
/// `failure_threshold` with at least `min_samples` recorded outcomes;
/// Open→HalfOpen after `cooldown`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerPolicy {
    #[serde(with = "duration_secs")]
    pub window: Duration,
    pub failure_threshold: f64,
    /// Minimum outcomes in the window before the rate is evaluated,
    /// so a single failed call cannot trip the breaker.
    pub min_samples: usize,
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            failure_threshold: 0.5,
            min_samples: 4,
            cooldown: Duration::from_secs(30),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// External call timeouts
// ═══════════════════════════════════════════════════════════

/// Bounded wait per external call site. Exceeding the bound is classified
/// as a transient failure and enters the retry/breaker path.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutPolicy {
    #[serde(with = "duration_secs")]
    pub structure_extraction: Duration,
    #[serde(with = "duration_secs")]
    pub model_validation: Duration,
    #[serde(with = "duration_secs")]
    pub translation: Duration,
    #[serde(with = "duration_secs")]
    pub case_records: Duration,
    #[serde(with = "duration_secs")]
    pub citation_lookup: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            structure_extraction: Duration::from_secs(60),
            model_validation: Duration::from_secs(90),
            translation: Duration::from_secs(30),
            case_records: Duration::from_secs(45),
            citation_lookup: Duration::from_secs(45),
        }
    }
}

impl TimeoutPolicy {
    pub fn for_dependency(&self, dependency: Dependency) -> Duration {
        match dependency {
            Dependency::StructureExtraction => self.structure_extraction,
            Dependency::ModelValidation => self.model_validation,
            Dependency::Translation => self.translation,
            Dependency::CaseRecords => self.case_records,
            Dependency::CitationLookup => self.citation_lookup,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════

/// Trial-readiness weights and the contradiction severity penalty map.
///
/// score = w_procedural·compliance + w_factual·consistency + w_caselaw·validity
#[derive(Debug, Clone, Serialize)]
pub struct ScoringPolicy {
    pub w_procedural: f64,
    pub w_factual: f64,
    pub w_caselaw: f64,
    pub penalty_high: f64,
    pub penalty_medium: f64,
    pub penalty_low: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            w_procedural: 0.4,
            w_factual: 0.3,
            w_caselaw: 0.3,
            penalty_high: 0.30,
            penalty_medium: 0.15,
            penalty_low: 0.05,
        }
    }
}

impl ScoringPolicy {
    pub fn severity_penalty(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.penalty_high,
            Severity::Medium => self.penalty_medium,
            Severity::Low => self.penalty_low,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Bundle
// ═══════════════════════════════════════════════════════════

/// Everything the coordinator needs in one place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelinePolicies {
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
    pub timeouts: TimeoutPolicy,
    pub scoring: ScoringPolicy,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
